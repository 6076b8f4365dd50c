use std::time::Duration;

use log::{info, warn};

use super::DaqClient;
use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::Tag;
use crate::types::ZiValue;
use crate::utils::poll_until;

/// State of the server-side AWG sequencer compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerStatus {
    /// No compilation has finished yet.
    Idle,
    Success,
    Failed,
    SuccessWithWarnings,
}

impl CompilerStatus {
    fn from_code(code: i32) -> Result<Self, ZiError> {
        match code {
            -1 => Ok(CompilerStatus::Idle),
            0 => Ok(CompilerStatus::Success),
            1 => Ok(CompilerStatus::Failed),
            2 => Ok(CompilerStatus::SuccessWithWarnings),
            other => Err(ZiError::Protocol(format!(
                "Unknown compiler status code {other}"
            ))),
        }
    }
}

impl DaqClient {
    /// Upload sequencer source text for one AWG core. Compilation starts
    /// server-side as soon as the source arrives; follow up with
    /// [`DaqClient::awg_wait_compiled`].
    pub fn awg_upload_source(
        &mut self,
        serial: &str,
        awg_index: u32,
        source: &str,
    ) -> Result<(), ZiError> {
        if source.trim().is_empty() {
            return Err(ZiError::InvalidArgument(
                "Empty sequencer program".to_string(),
            ));
        }
        self.transact(
            "Awg.UploadSource",
            vec![
                ZiValue::String(serial.to_ascii_lowercase()),
                ZiValue::U32(awg_index),
                ZiValue::String(source.to_string()),
            ],
            &[Tag::Str, Tag::U32, Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Current compiler state: status, status message, progress in [0, 1].
    pub fn awg_compiler_status(
        &mut self,
        serial: &str,
        awg_index: u32,
    ) -> Result<(CompilerStatus, String, f64), ZiError> {
        let result = self.transact(
            "Awg.CompilerStatus",
            vec![
                ZiValue::String(serial.to_ascii_lowercase()),
                ZiValue::U32(awg_index),
            ],
            &[Tag::Str, Tag::U32],
            &[Tag::I32, Tag::Str, Tag::F64],
        )?;
        if result.len() < 3 {
            return Err(ZiError::Protocol(
                "Incomplete compiler status response".to_string(),
            ));
        }
        Ok((
            CompilerStatus::from_code(result[0].as_i32()?)?,
            result[1].as_str()?.to_string(),
            result[2].as_f64()?,
        ))
    }

    /// Block until the compiler leaves the idle state, then map the
    /// outcome: warnings are logged, failure carries the compiler
    /// message.
    pub fn awg_wait_compiled(
        &mut self,
        serial: &str,
        awg_index: u32,
        timeout: Duration,
    ) -> Result<(), ZiError> {
        let mut last: Option<(CompilerStatus, String)> = None;
        poll_until(
            || {
                let (status, message, _) = self.awg_compiler_status(serial, awg_index)?;
                let done = status != CompilerStatus::Idle;
                last = Some((status, message));
                Ok::<bool, ZiError>(done)
            },
            timeout,
            Duration::from_millis(100),
        )?;
        match last {
            Some((CompilerStatus::Success, _)) => {
                info!("Sequencer program compiled");
                Ok(())
            }
            Some((CompilerStatus::SuccessWithWarnings, message)) => {
                warn!("Sequencer program compiled with warnings: {message}");
                Ok(())
            }
            Some((CompilerStatus::Failed, message)) => Err(ZiError::Compiler(message)),
            _ => Err(ZiError::Protocol(
                "Compiler left idle state without a status".to_string(),
            )),
        }
    }

    /// Overwrite one wave of the AWG waveform memory.
    ///
    /// The sequencer program must already define a placeholder wave of
    /// the same length at this index.
    pub fn awg_write_waveform(
        &mut self,
        serial: &str,
        awg_index: u32,
        wave_index: u32,
        samples: &[f64],
    ) -> Result<(), ZiError> {
        if samples.is_empty() {
            return Err(ZiError::InvalidArgument("Empty waveform".to_string()));
        }
        let path = NodePath::parse(&format!(
            "/{serial}/awgs/{awg_index}/waveform/waves/{wave_index}"
        ))?;
        self.set_vector_double(&path, samples)
    }

    /// Start (or stop) the sequencer. With `single` set, the sequencer
    /// disables itself after one pass.
    pub fn awg_enable(
        &mut self,
        serial: &str,
        awg_index: u32,
        enable: bool,
        single: bool,
    ) -> Result<(), ZiError> {
        let base = NodePath::parse(&format!("/{serial}/awgs/{awg_index}"))?;
        self.set_int(&base.join("single")?, i64::from(single))?;
        self.set_int(&base.join("enable")?, i64::from(enable))
    }
}
