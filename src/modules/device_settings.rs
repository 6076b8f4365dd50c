use log::info;
use std::path::Path;
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::error::ZiError;

/// Device settings module: saves the full device node tree to an XML
/// settings file on the data-server host, or applies such a file back.
pub struct DeviceSettings<'a> {
    module: Module<'a>,
}

impl<'a> DeviceSettings<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::DeviceSettings)?,
        })
    }

    /// Save the settings of `device` to `filename` (without extension)
    /// inside `directory` on the data-server host.
    pub fn save(
        &mut self,
        device: &str,
        filename: &str,
        directory: Option<&Path>,
        timeout: Duration,
    ) -> Result<(), ZiError> {
        info!("Saving settings of {device} to {filename}");
        self.run_command(device, filename, directory, "save", timeout)
    }

    /// Apply a previously saved settings file to `device`.
    pub fn load(
        &mut self,
        device: &str,
        filename: &str,
        directory: Option<&Path>,
        timeout: Duration,
    ) -> Result<(), ZiError> {
        info!("Loading settings of {device} from {filename}");
        self.run_command(device, filename, directory, "load", timeout)
    }

    fn run_command(
        &mut self,
        device: &str,
        filename: &str,
        directory: Option<&Path>,
        command: &str,
        timeout: Duration,
    ) -> Result<(), ZiError> {
        if filename.is_empty() {
            return Err(ZiError::InvalidArgument(
                "settings filename must not be empty".to_string(),
            ));
        }
        self.module.set_string("device", device)?;
        self.module.set_string("filename", filename)?;
        if let Some(directory) = directory {
            let directory = directory.to_str().ok_or_else(|| {
                ZiError::InvalidArgument(format!("settings path is not UTF-8: {directory:?}"))
            })?;
            self.module.set_string("path", directory)?;
        }
        self.module.set_string("command", command)?;
        self.module.execute()?;
        self.module
            .wait_finished(timeout, Duration::from_millis(200))
    }
}
