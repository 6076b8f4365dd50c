use log::{debug, info};
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::error::ZiError;
use crate::utils::{poll_until, PollError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdsStatus {
    /// Synchronization failed, e.g. devices on different clock sources.
    Error,
    Idle,
    Syncing,
    /// All devices in the group share a common timebase.
    Synchronized,
}

impl MdsStatus {
    fn from_code(code: i64) -> Result<Self, ZiError> {
        match code {
            -1 => Ok(MdsStatus::Error),
            0 => Ok(MdsStatus::Idle),
            1 => Ok(MdsStatus::Syncing),
            2 => Ok(MdsStatus::Synchronized),
            other => Err(ZiError::Protocol(format!(
                "unknown multi-device sync status {other}"
            ))),
        }
    }
}

/// Multi-device synchronization module: aligns the timestamps of several
/// devices on the same data server so their streams can be combined.
pub struct MultiDeviceSync<'a> {
    module: Module<'a>,
}

impl<'a> MultiDeviceSync<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::MultiDeviceSync)?,
        })
    }

    /// Start synchronizing `devices` as sync group `group`. The first
    /// device in the list becomes the synchronization master.
    pub fn start(&mut self, devices: &[&str], group: u32) -> Result<(), ZiError> {
        if devices.len() < 2 {
            return Err(ZiError::InvalidArgument(format!(
                "synchronization needs at least two devices, got {}",
                devices.len()
            )));
        }
        info!("Synchronizing devices {}", devices.join(", "));
        self.module.set_int("start", 0)?;
        self.module.set_int("group", i64::from(group))?;
        self.module.execute()?;
        self.module.set_string("devices", &devices.join(","))?;
        self.module.set_int("start", 1)?;
        Ok(())
    }

    pub fn status(&mut self) -> Result<MdsStatus, ZiError> {
        MdsStatus::from_code(self.module.get_int("status")?)
    }

    /// Block until the group reports [`MdsStatus::Synchronized`].
    pub fn wait_synchronized(&mut self, timeout: Duration) -> Result<(), ZiError> {
        let module = &mut self.module;
        let outcome = poll_until(
            || match MdsStatus::from_code(module.get_int("status")?)? {
                MdsStatus::Synchronized => Ok(true),
                MdsStatus::Error => Err(ZiError::Protocol(
                    "multi-device synchronization failed".to_string(),
                )),
                status => {
                    debug!("Synchronization status: {status:?}");
                    Ok(false)
                }
            },
            timeout,
            Duration::from_millis(500),
        );
        match outcome {
            Ok(()) => {
                info!("Devices synchronized");
                Ok(())
            }
            Err(PollError::Timeout) => Err(ZiError::Timeout),
            Err(PollError::ConditionError(e)) => Err(e),
        }
    }

    pub fn finish(&mut self) -> Result<(), ZiError> {
        self.module.finish()
    }
}
