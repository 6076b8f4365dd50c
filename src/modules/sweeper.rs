use log::warn;
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::data::PollResult;
use crate::error::ZiError;
use crate::node::NodePath;
use crate::utils::poll_until;

/// Spacing of sweep points between start and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMapping {
    Linear,
    Logarithmic,
}

/// Order in which the sweeper visits its grid points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Sequential,
    Binary,
    Bidirectional,
    Reverse,
}

/// How the sweeper chooses the demodulator bandwidth per point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandwidthControl {
    /// Use the bandwidth set on the device.
    Manual,
    /// Use the fixed bandwidth from the config.
    Fixed(f64),
    /// Let the sweeper pick per point.
    Auto,
}

/// Parameters of a sweep; field names follow the module's parameter
/// vocabulary.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Device the sweep runs on, e.g. "dev2006". Must be set.
    pub device: String,
    /// Device-relative node the sweeper varies, e.g. "oscs/0/freq".
    pub grid_node: String,
    pub start: f64,
    pub stop: f64,
    pub samplecount: u32,
    pub mapping: SweepMapping,
    pub bandwidth_control: BandwidthControl,
    /// Allow a point's bandwidth to overlap neighboring points.
    pub bandwidth_overlap: bool,
    pub scan: ScanMode,
    /// Number of sweeps to run back to back.
    pub loopcount: u32,
    /// Fixed settling time before recording each point, seconds.
    pub settling_time: f64,
    /// Remaining proportion of the step response to wait out.
    pub settling_inaccuracy: f64,
    /// Minimum averaging time per point in demod filter time constants.
    pub averaging_tc: f64,
    /// Minimum number of samples averaged per point.
    pub averaging_samples: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            grid_node: "oscs/0/freq".to_string(),
            start: 4e3,
            stop: 50e6,
            samplecount: 100,
            mapping: SweepMapping::Logarithmic,
            bandwidth_control: BandwidthControl::Auto,
            bandwidth_overlap: false,
            scan: ScanMode::Sequential,
            loopcount: 1,
            settling_time: 0.0,
            settling_inaccuracy: 0.001,
            averaging_tc: 10.0,
            averaging_samples: 10,
        }
    }
}

/// Frequency/parameter sweeper running inside the data server.
pub struct Sweeper<'a> {
    module: Module<'a>,
}

impl<'a> Sweeper<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::Sweeper)?,
        })
    }

    pub fn configure(&mut self, config: &SweepConfig) -> Result<(), ZiError> {
        if config.device.is_empty() {
            return Err(ZiError::InvalidArgument(
                "SweepConfig.device must be set".to_string(),
            ));
        }
        if config.samplecount == 0 {
            return Err(ZiError::InvalidArgument(
                "SweepConfig.samplecount must be at least 1".to_string(),
            ));
        }
        self.module.set_string("device", &config.device)?;
        self.module.set_string("gridnode", &config.grid_node)?;
        self.module.set_double("start", config.start)?;
        self.module.set_double("stop", config.stop)?;
        self.module
            .set_int("samplecount", i64::from(config.samplecount))?;
        self.module.set_int(
            "xmapping",
            match config.mapping {
                SweepMapping::Linear => 0,
                SweepMapping::Logarithmic => 1,
            },
        )?;
        match config.bandwidth_control {
            BandwidthControl::Manual => self.module.set_int("bandwidthcontrol", 0)?,
            BandwidthControl::Fixed(bandwidth) => {
                if bandwidth <= 0.0 {
                    return Err(ZiError::InvalidArgument(
                        "Fixed sweep bandwidth must be positive".to_string(),
                    ));
                }
                self.module.set_int("bandwidthcontrol", 1)?;
                self.module.set_double("bandwidth", bandwidth)?;
            }
            BandwidthControl::Auto => self.module.set_int("bandwidthcontrol", 2)?,
        }
        self.module
            .set_int("bandwidthoverlap", i64::from(config.bandwidth_overlap))?;
        self.module.set_int(
            "scan",
            match config.scan {
                ScanMode::Sequential => 0,
                ScanMode::Binary => 1,
                ScanMode::Bidirectional => 2,
                ScanMode::Reverse => 3,
            },
        )?;
        self.module
            .set_int("loopcount", i64::from(config.loopcount))?;
        self.module
            .set_double("settling/time", config.settling_time)?;
        self.module
            .set_double("settling/inaccuracy", config.settling_inaccuracy)?;
        self.module
            .set_double("averaging/tc", config.averaging_tc)?;
        self.module
            .set_int("averaging/sample", i64::from(config.averaging_samples))?;
        Ok(())
    }

    /// Record sweep data for this node, typically a demod sample path.
    pub fn subscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.module.subscribe(path)
    }

    pub fn unsubscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.module.unsubscribe(path)
    }

    pub fn execute(&mut self) -> Result<(), ZiError> {
        self.module.execute()
    }

    pub fn progress(&mut self) -> Result<f64, ZiError> {
        self.module.progress()
    }

    pub fn finished(&mut self) -> Result<bool, ZiError> {
        self.module.finished()
    }

    pub fn finish(&mut self) -> Result<(), ZiError> {
        self.module.finish()
    }

    /// Intermediate or final read of the recorded sweeps.
    pub fn read(&mut self) -> Result<PollResult, ZiError> {
        self.module.read()
    }

    /// Run the configured sweep to completion and return the final read.
    ///
    /// If the sweep is still running when `timeout` elapses it is forced
    /// to stop, matching how the example scripts bound a blocking sweep;
    /// whatever was recorded up to that point is returned.
    pub fn run(&mut self, timeout: Duration) -> Result<PollResult, ZiError> {
        self.module.execute()?;
        match self.module.wait_finished(timeout, Duration::from_millis(200)) {
            Ok(()) => {}
            Err(ZiError::Timeout) => {
                warn!("Sweep not finished after {timeout:?}, forcing finish");
            }
            Err(e) => return Err(e),
        }
        // Trailing data only arrives with a read after the loop exits.
        self.module.read()
    }

    /// Configure file export of the recorded data. `format` is "csv" or
    /// "mat"; the server writes below its own data directory, in a
    /// numerically incrementing subdirectory per save.
    pub fn set_save(&mut self, filename: &str, format: &str) -> Result<(), ZiError> {
        self.module.set_string("save/filename", filename)?;
        self.module.set_string("save/fileformat", format)
    }

    /// Trigger a save and wait for the background write to complete.
    ///
    /// Must happen before the final read, otherwise there is no data
    /// left to save.
    pub fn save(&mut self, timeout: Duration) -> Result<(), ZiError> {
        self.module.set_int("save/save", 1)?;
        poll_until(
            || Ok::<bool, ZiError>(self.module.get_int("save/save")? == 0),
            timeout,
            Duration::from_millis(100),
        )?;
        Ok(())
    }
}
