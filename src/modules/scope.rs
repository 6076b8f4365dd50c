use log::warn;
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::data::PollResult;
use crate::error::ZiError;
use crate::node::NodePath;
use crate::utils::poll_until;

/// Processing applied to scope shots inside the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Pass through time-domain records.
    Time,
    /// Return the FFT magnitude of each record.
    Fft,
}

/// Window applied before the FFT in [`ScopeMode::Fft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftWindow {
    Rectangular,
    Hann,
}

#[derive(Debug, Clone)]
pub struct ScopeConfig {
    pub mode: ScopeMode,
    /// Exponential averaging weight; 1 disables averaging.
    pub averager_weight: u32,
    /// Number of records kept in the module's history; older records are
    /// overwritten as new ones arrive from the device.
    pub history_length: u32,
    pub fft_window: FftWindow,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            mode: ScopeMode::Time,
            averager_weight: 1,
            history_length: 20,
            fft_window: FftWindow::Hann,
        }
    }
}

/// Scope record collector running inside the data server.
///
/// The device-side scope (trigger, length, input selection) is
/// configured through plain node writes under `/devN/scopes/0/`; this
/// module receives the resulting shots and assembles records.
pub struct ScopeModule<'a> {
    module: Module<'a>,
}

impl<'a> ScopeModule<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::Scope)?,
        })
    }

    pub fn configure(&mut self, config: &ScopeConfig) -> Result<(), ZiError> {
        if config.averager_weight == 0 {
            return Err(ZiError::InvalidArgument(
                "averager_weight must be at least 1".to_string(),
            ));
        }
        self.module.set_int(
            "mode",
            match config.mode {
                ScopeMode::Time => 1,
                ScopeMode::Fft => 3,
            },
        )?;
        self.module
            .set_int("averager/weight", i64::from(config.averager_weight))?;
        self.module
            .set_int("historylength", i64::from(config.history_length))?;
        self.module.set_int(
            "fft/window",
            match config.fft_window {
                FftWindow::Rectangular => 0,
                FftWindow::Hann => 1,
            },
        )?;
        Ok(())
    }

    /// Subscribe to a scope wave node, e.g. `/dev2006/scopes/0/wave`.
    pub fn subscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.module.subscribe(path)
    }

    /// Number of records currently held by the module.
    pub fn records(&mut self) -> Result<u32, ZiError> {
        Ok(self.module.get_int("records")? as u32)
    }

    pub fn progress(&mut self) -> Result<f64, ZiError> {
        self.module.progress()
    }

    /// Enable the device scope, collect at least `min_records` records,
    /// then disable it again and read out the module.
    ///
    /// On timeout whatever records arrived so far are returned, matching
    /// the example scripts' bounded collection loop.
    pub fn get_records(
        &mut self,
        device: &str,
        min_records: u32,
        timeout: Duration,
    ) -> Result<PollResult, ZiError> {
        let enable = NodePath::parse(&format!("/{device}/scopes/0/enable"))?;

        self.module.execute()?;
        self.module.client().set_int(&enable, 1)?;
        self.module.client().sync()?;

        let collected = poll_until(
            || {
                let records = self.records()?;
                let progress = self.progress()?;
                Ok::<bool, ZiError>(records >= min_records && progress >= 1.0)
            },
            timeout,
            Duration::from_millis(500),
        );
        match collected {
            Ok(()) => {}
            Err(crate::utils::PollError::Timeout) => warn!(
                "Scope module still collecting after {timeout:?}; \
                 returning the records acquired so far"
            ),
            Err(crate::utils::PollError::ConditionError(e)) => {
                // Do not leave the device scope running on failure.
                let _ = self.module.client().set_int(&enable, 0);
                return Err(e);
            }
        }

        self.module.client().set_int(&enable, 0)?;
        let data = self.module.read()?;
        self.module.finish()?;
        Ok(data)
    }
}
