use std::time::Duration;

use super::DaqClient;
use crate::data::{self, PollResult};
use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::Tag;
use crate::types::ZiValue;

/// Flags controlling `poll` behavior.
pub mod poll_flags {
    /// Default behavior.
    pub const NONE: u32 = 0;
    /// Fill holes from sample loss with NaN instead of dropping them.
    pub const FILL_GAPS: u32 = 1;
    /// Report sample loss as a server error instead of a flag.
    pub const THROW_ON_LOSS: u32 = 4;
}

impl DaqClient {
    /// Subscribe to a streaming node; wildcards are allowed.
    ///
    /// Data starts accumulating server-side immediately and is returned
    /// by the next [`DaqClient::poll`].
    pub fn subscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.transact(
            "Stream.Subscribe",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Unsubscribe from a streaming node; wildcards are allowed.
    pub fn unsubscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.transact(
            "Stream.Unsubscribe",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Unsubscribe from all streaming nodes.
    pub fn unsubscribe_all(&mut self) -> Result<(), ZiError> {
        self.transact(
            "Stream.Unsubscribe",
            vec![ZiValue::String("*".to_string())],
            &[Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Record subscribed data for `duration`, then return everything
    /// accumulated since the subscribe or the previous poll.
    ///
    /// Blocks for at least `duration`; `timeout` bounds how much longer
    /// the server may take to assemble the response. An empty result is
    /// valid, e.g. when the subscribed demodulator is disabled or its
    /// rate is zero.
    pub fn poll(
        &mut self,
        duration: Duration,
        timeout: Duration,
        flags: u32,
    ) -> Result<PollResult, ZiError> {
        // The blocking window exceeds the normal per-response read
        // timeout, so widen it for the duration of this call.
        let normal = self.config.read_timeout;
        self.stream
            .set_read_timeout(Some(duration + timeout + normal))?;
        let result = self.transact_raw(
            "Stream.Poll",
            vec![
                ZiValue::F64(duration.as_secs_f64()),
                ZiValue::U32(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)),
                ZiValue::U32(flags),
            ],
            &[Tag::F64, Tag::U32, Tag::U32],
        );
        self.stream.set_read_timeout(Some(normal))?;
        data::parse_records(&result?)
    }
}
