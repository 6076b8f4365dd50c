use std::time::{Duration, Instant};

/// Error type for bounded polling loops.
#[derive(Debug)]
pub enum PollError<E> {
    /// The condition did not become true within the timeout.
    Timeout,
    /// The condition itself failed.
    ConditionError(E),
}

impl<E> std::fmt::Display for PollError<E>
where
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout => write!(f, "Operation timed out"),
            PollError::ConditionError(e) => write!(f, "Condition error: {e}"),
        }
    }
}

impl<E> std::error::Error for PollError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Timeout => None,
            PollError::ConditionError(e) => Some(e),
        }
    }
}

impl From<PollError<crate::error::ZiError>> for crate::error::ZiError {
    fn from(err: PollError<crate::error::ZiError>) -> Self {
        match err {
            PollError::Timeout => crate::error::ZiError::Timeout,
            PollError::ConditionError(e) => e,
        }
    }
}

/// Poll a condition with timeout.
///
/// Repeatedly calls `condition` until it returns `Ok(true)` or the
/// timeout elapses. This is the loop every acquisition uses to wait for
/// a server-side module to report completion.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use zidaq::utils::poll_until;
/// use zidaq::DaqClient;
///
/// let mut client = DaqClient::builder().host("127.0.0.1").port(8004).connect()?;
/// let mut module = client.module(zidaq::ModuleKind::Sweeper)?;
/// module.execute()?;
/// poll_until(
///     || module.finished(),
///     Duration::from_secs(60),
///     Duration::from_millis(200),
/// )?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn poll_until<F, E>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();

    loop {
        match condition() {
            Ok(true) => return Ok(()),
            Ok(false) => {
                if start.elapsed() >= timeout {
                    return Err(PollError::Timeout);
                }
                std::thread::sleep(poll_interval);
            }
            Err(e) => return Err(PollError::ConditionError(e)),
        }
    }
}

/// Poll an operation that eventually yields a value.
///
/// Repeatedly calls `operation` until it returns `Ok(Some(T))`. Returns
/// `Ok(None)` when the timeout elapses first.
pub fn poll_with_timeout<F, T, E>(
    mut operation: F,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<T>, PollError<E>>
where
    F: FnMut() -> Result<Option<T>, E>,
{
    let start = Instant::now();

    loop {
        match operation() {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    return Ok(None);
                }
                std::thread::sleep(poll_interval);
            }
            Err(e) => return Err(PollError::ConditionError(e)),
        }
    }
}

/// Time for a demodulator low-pass filter to settle after a parameter
/// change, estimated as ten time constants scaled by filter order.
pub fn settling_time(time_constant: Duration, order: u32) -> Duration {
    time_constant * 10 * order.max(1)
}

/// Convert device timestamp ticks to seconds using the device clockbase.
pub fn ticks_to_seconds(clockbase: f64, ticks: u64) -> f64 {
    ticks as f64 / clockbase
}

/// Duration covered by a span of timestamps, in seconds.
pub fn span_seconds(clockbase: f64, first: u64, last: u64) -> f64 {
    ticks_to_seconds(clockbase, last.saturating_sub(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_until_times_out_when_condition_never_holds() {
        let start = Instant::now();
        let result: Result<(), PollError<std::convert::Infallible>> = poll_until(
            || Ok(false),
            Duration::from_millis(50),
            Duration::from_millis(5),
        );
        assert!(matches!(result, Err(PollError::Timeout)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn poll_until_returns_as_soon_as_condition_holds() {
        let mut calls = 0;
        let result: Result<(), PollError<std::convert::Infallible>> = poll_until(
            || {
                calls += 1;
                Ok(calls >= 3)
            },
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn poll_until_propagates_condition_errors() {
        let result: Result<(), PollError<&str>> = poll_until(
            || Err("device gone"),
            Duration::from_secs(1),
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(PollError::ConditionError("device gone"))));
    }

    #[test]
    fn poll_with_timeout_yields_none_on_timeout() {
        let result: Result<Option<u32>, PollError<std::convert::Infallible>> = poll_with_timeout(
            || Ok(None),
            Duration::from_millis(20),
            Duration::from_millis(5),
        );
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn ticks_convert_with_the_clockbase() {
        let clockbase = 60e6;
        assert!((ticks_to_seconds(clockbase, 60_000_000) - 1.0).abs() < 1e-12);
        assert!((span_seconds(clockbase, 30_000_000, 90_000_000) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn settling_time_scales_with_order() {
        assert_eq!(
            settling_time(Duration::from_millis(10), 4),
            Duration::from_millis(400)
        );
        assert_eq!(
            settling_time(Duration::from_millis(10), 0),
            Duration::from_millis(100)
        );
    }
}
