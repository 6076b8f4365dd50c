use log::debug;
use std::time::Duration;

use crate::daq::DaqClient;
use crate::data::{self, PollResult};
use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::Tag;
use crate::types::ZiValue;
use crate::utils::poll_until;

pub mod daq;
pub mod device_settings;
pub mod mds;
pub mod pid_advisor;
pub mod scope;
pub mod sweeper;

pub use daq::{DaqConfig, DaqModule, GridMode, TriggerEdge, TriggerType};
pub use device_settings::DeviceSettings;
pub use mds::{MdsStatus, MultiDeviceSync};
pub use pid_advisor::{DutSource, PidAdvice, PidAdvisor, PidAdvisorConfig};
pub use scope::{FftWindow, ScopeConfig, ScopeMode, ScopeModule};
pub use sweeper::{BandwidthControl, ScanMode, SweepConfig, SweepMapping, Sweeper};

/// Kinds of server-side modules a session can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Sweeper,
    Scope,
    DataAcquisition,
    PidAdvisor,
    DeviceSettings,
    MultiDeviceSync,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Sweeper => "sweeper",
            ModuleKind::Scope => "scope",
            ModuleKind::DataAcquisition => "daq",
            ModuleKind::PidAdvisor => "pidadvisor",
            ModuleKind::DeviceSettings => "devicesettings",
            ModuleKind::MultiDeviceSync => "mds",
        }
    }
}

impl DaqClient {
    /// Instantiate a server-side module.
    ///
    /// The returned handle borrows the client exclusively for its
    /// lifetime; the server-side task is released when the handle is
    /// dropped.
    pub fn module(&mut self, kind: ModuleKind) -> Result<Module<'_>, ZiError> {
        let result = self.transact(
            "Module.Open",
            vec![ZiValue::String(kind.as_str().to_string())],
            &[Tag::Str],
            &[Tag::U32],
        )?;
        let handle = result
            .first()
            .ok_or_else(|| ZiError::Protocol("No module handle returned".to_string()))?
            .as_u32()?;
        debug!("Opened {} module, handle {handle}", kind.as_str());
        Ok(Module {
            client: self,
            handle,
            kind,
        })
    }
}

/// Handle to a server-side asynchronous task.
///
/// Lifecycle: configure with the typed setters, `execute`, then loop on
/// `read`/`progress`/`finished` until done (or force the end with
/// `finish`). The server-side instance is closed when the handle drops.
pub struct Module<'a> {
    client: &'a mut DaqClient,
    handle: u32,
    kind: ModuleKind,
}

impl Module<'_> {
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// The client this module was opened on, for interleaved node access.
    pub fn client(&mut self) -> &mut DaqClient {
        self.client
    }

    pub fn set_int(&mut self, param: &str, value: i64) -> Result<(), ZiError> {
        self.client.transact(
            "Module.SetI",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
                ZiValue::I64(value),
            ],
            &[Tag::U32, Tag::Str, Tag::I64],
            &[],
        )?;
        Ok(())
    }

    pub fn set_double(&mut self, param: &str, value: f64) -> Result<(), ZiError> {
        self.client.transact(
            "Module.SetD",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
                ZiValue::F64(value),
            ],
            &[Tag::U32, Tag::Str, Tag::F64],
            &[],
        )?;
        Ok(())
    }

    pub fn set_string(&mut self, param: &str, value: &str) -> Result<(), ZiError> {
        self.client.transact(
            "Module.SetS",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
                ZiValue::String(value.to_string()),
            ],
            &[Tag::U32, Tag::Str, Tag::Str],
            &[],
        )?;
        Ok(())
    }

    pub fn get_int(&mut self, param: &str) -> Result<i64, ZiError> {
        let result = self.client.transact(
            "Module.GetI",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[Tag::I64],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::Protocol(format!("No value for module param {param}")))?
            .as_i64()
    }

    pub fn get_double(&mut self, param: &str) -> Result<f64, ZiError> {
        let result = self.client.transact(
            "Module.GetD",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[Tag::F64],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::Protocol(format!("No value for module param {param}")))?
            .as_f64()
    }

    pub fn get_string(&mut self, param: &str) -> Result<String, ZiError> {
        let result = self.client.transact(
            "Module.GetS",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(param.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[Tag::Str],
        )?;
        Ok(result
            .first()
            .ok_or_else(|| ZiError::Protocol(format!("No value for module param {param}")))?
            .as_str()?
            .to_string())
    }

    /// Module-level subscribe: the module records data for this node
    /// while it runs (distinct from the session-level streaming
    /// subscribe).
    pub fn subscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.client.transact(
            "Module.Subscribe",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(path.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[],
        )?;
        Ok(())
    }

    pub fn unsubscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.client.transact(
            "Module.Unsubscribe",
            vec![
                ZiValue::U32(self.handle),
                ZiValue::String(path.to_string()),
            ],
            &[Tag::U32, Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Start the module's server-side thread.
    pub fn execute(&mut self) -> Result<(), ZiError> {
        self.client.transact(
            "Module.Execute",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
            &[],
        )?;
        Ok(())
    }

    /// Read everything the module has accumulated so far. Valid while
    /// running (intermediate data) and after finishing (trailing data).
    pub fn read(&mut self) -> Result<PollResult, ZiError> {
        let body = self.client.transact_raw(
            "Module.Read",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
        )?;
        data::parse_records(&body)
    }

    /// Progress of the running task in [0, 1].
    pub fn progress(&mut self) -> Result<f64, ZiError> {
        let result = self.client.transact(
            "Module.Progress",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
            &[Tag::F64],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::Protocol("No progress returned".to_string()))?
            .as_f64()
    }

    pub fn finished(&mut self) -> Result<bool, ZiError> {
        let result = self.client.transact(
            "Module.Finished",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
            &[Tag::U32],
        )?;
        Ok(result
            .first()
            .ok_or_else(|| ZiError::Protocol("No finished flag returned".to_string()))?
            .as_u32()?
            != 0)
    }

    /// Ask the server-side task to stop. Data recorded so far stays
    /// readable.
    pub fn finish(&mut self) -> Result<(), ZiError> {
        self.client.transact(
            "Module.Finish",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
            &[],
        )?;
        Ok(())
    }

    /// Block until the module reports finished, logging progress.
    ///
    /// On timeout the task is forced to stop with [`Module::finish`] and
    /// `ZiError::Timeout` is returned; any data recorded up to that point
    /// can still be read.
    pub fn wait_finished(&mut self, timeout: Duration, interval: Duration) -> Result<(), ZiError> {
        let result = poll_until(
            || {
                if self.finished()? {
                    return Ok(true);
                }
                debug!(
                    "{} module progress: {:.0}%",
                    self.kind.as_str(),
                    self.progress()? * 100.0
                );
                Ok::<bool, ZiError>(false)
            },
            timeout,
            interval,
        );
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let err: ZiError = e.into();
                if matches!(err, ZiError::Timeout) {
                    self.finish()?;
                }
                Err(err)
            }
        }
    }
}

impl Drop for Module<'_> {
    fn drop(&mut self) {
        let _ = self.client.transact(
            "Module.Close",
            vec![ZiValue::U32(self.handle)],
            &[Tag::U32],
            &[],
        );
    }
}
