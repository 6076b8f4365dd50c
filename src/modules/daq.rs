use log::warn;
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::data::PollResult;
use crate::error::ZiError;
use crate::node::NodePath;

/// Trigger condition starting one grid acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    /// No trigger, acquire back to back.
    Continuous,
    /// Level crossing with hysteresis.
    Edge,
    Pulse,
    /// Edge trigger on a lowpassed copy of the signal, for slowly
    /// drifting baselines.
    Tracking,
    HardwareTrigger,
}

impl TriggerType {
    fn code(self) -> i64 {
        match self {
            TriggerType::Continuous => 0,
            TriggerType::Edge => 1,
            TriggerType::Pulse => 2,
            TriggerType::Tracking => 3,
            TriggerType::HardwareTrigger => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    Rising,
    Falling,
    Both,
}

impl TriggerEdge {
    fn code(self) -> i64 {
        match self {
            TriggerEdge::Rising => 1,
            TriggerEdge::Falling => 2,
            TriggerEdge::Both => 3,
        }
    }
}

/// Interpolation of device samples onto the acquisition grid columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    /// Take the nearest device sample in time.
    Nearest,
    /// Linear interpolation between neighboring samples.
    Linear,
    /// Grid spacing defined by the highest subscribed sampling rate;
    /// duration becomes read-only.
    Exact,
}

impl GridMode {
    fn code(self) -> i64 {
        match self {
            GridMode::Nearest => 1,
            GridMode::Linear => 2,
            GridMode::Exact => 4,
        }
    }
}

/// Parameters of a triggered grid acquisition.
#[derive(Debug, Clone)]
pub struct DaqConfig {
    /// Device providing the trigger, e.g. "dev2006". Must be set.
    pub device: String,
    /// Node (with optional field suffix) the trigger watches, e.g.
    /// `/dev2006/demods/0/sample.r`.
    pub trigger_node: String,
    pub trigger_type: TriggerType,
    pub edge: TriggerEdge,
    pub level: f64,
    /// Arming band below (above for falling edge) the level; keeps
    /// triggering robust against noise.
    pub hysteresis: f64,
    /// Time offset of the recorded window relative to the trigger point;
    /// negative values record pre-trigger data.
    pub delay: f64,
    /// Dead time after each trigger before re-arming, seconds.
    pub holdoff_time: f64,
    pub holdoff_count: u32,
    /// Number of triggers to acquire; ignored in endless mode.
    pub count: u32,
    /// Length of each recorded window, seconds.
    pub duration: f64,
    pub grid_mode: GridMode,
    /// Samples per row of the grid.
    pub grid_cols: u32,
    pub grid_rows: u32,
    /// Triggers averaged into each grid row.
    pub grid_repetitions: u32,
    /// Re-arm forever; readout happens via intermediate reads.
    pub endless: bool,
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            trigger_node: String::new(),
            trigger_type: TriggerType::Edge,
            edge: TriggerEdge::Rising,
            level: 0.0,
            hysteresis: 0.0,
            delay: 0.0,
            holdoff_time: 0.1,
            holdoff_count: 0,
            count: 1,
            duration: 0.1,
            grid_mode: GridMode::Linear,
            grid_cols: 100,
            grid_rows: 1,
            grid_repetitions: 1,
            endless: false,
        }
    }
}

/// Triggered data-acquisition module: records demod data into a grid on
/// each trigger, interpolating samples onto the grid columns.
pub struct DaqModule<'a> {
    module: Module<'a>,
}

impl<'a> DaqModule<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::DataAcquisition)?,
        })
    }

    pub fn configure(&mut self, config: &DaqConfig) -> Result<(), ZiError> {
        if config.device.is_empty() {
            return Err(ZiError::InvalidArgument(
                "DaqConfig.device must be set".to_string(),
            ));
        }
        if config.trigger_type != TriggerType::Continuous && config.trigger_node.is_empty() {
            return Err(ZiError::InvalidArgument(
                "DaqConfig.trigger_node must be set for triggered acquisition".to_string(),
            ));
        }
        self.module.set_string("device", &config.device)?;
        self.module
            .set_string("triggernode", &config.trigger_node)?;
        self.module.set_int("type", config.trigger_type.code())?;
        self.module.set_int("edge", config.edge.code())?;
        self.module.set_double("level", config.level)?;
        self.module.set_double("hysteresis", config.hysteresis)?;
        self.module.set_double("delay", config.delay)?;
        self.module
            .set_double("holdoff/time", config.holdoff_time)?;
        self.module
            .set_int("holdoff/count", i64::from(config.holdoff_count))?;
        self.module.set_int("count", i64::from(config.count))?;
        self.module.set_double("duration", config.duration)?;
        self.module
            .set_int("grid/mode", config.grid_mode.code())?;
        self.module
            .set_int("grid/cols", i64::from(config.grid_cols))?;
        self.module
            .set_int("grid/rows", i64::from(config.grid_rows))?;
        self.module
            .set_int("grid/repetitions", i64::from(config.grid_repetitions))?;
        self.module.set_int("endless", i64::from(config.endless))?;
        Ok(())
    }

    /// Record this signal into the grid. A field suffix selects a demod
    /// sample component, e.g. `/dev2006/demods/0/sample.r`.
    pub fn subscribe(&mut self, path: &NodePath) -> Result<(), ZiError> {
        self.module.subscribe(path)
    }

    pub fn execute(&mut self) -> Result<(), ZiError> {
        self.module.execute()
    }

    pub fn finished(&mut self) -> Result<bool, ZiError> {
        self.module.finished()
    }

    pub fn progress(&mut self) -> Result<f64, ZiError> {
        self.module.progress()
    }

    /// Intermediate read; in endless mode this is the only readout path.
    pub fn read(&mut self) -> Result<PollResult, ZiError> {
        self.module.read()
    }

    /// Run a bounded acquisition: execute, accumulate intermediate reads
    /// until the module finishes or `timeout` elapses, then collect any
    /// trailing data with a final read.
    pub fn run(&mut self, timeout: Duration) -> Result<PollResult, ZiError> {
        self.module.execute()?;

        let mut accumulated = PollResult::default();
        let start = std::time::Instant::now();
        loop {
            if self.module.finished()? {
                break;
            }
            if start.elapsed() >= timeout {
                warn!("Acquisition not complete after {timeout:?}, forcing finish");
                self.module.finish()?;
                break;
            }
            std::thread::sleep(Duration::from_millis(200));
            accumulated.merge(self.module.read()?);
        }
        accumulated.merge(self.module.read()?);
        Ok(accumulated)
    }
}
