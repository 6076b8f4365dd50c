pub mod daq;
pub mod data;
pub mod error;
pub mod logger;
pub mod modules;
pub mod node;
pub mod protocol;
pub mod types;
pub mod utils;

pub use daq::{
    poll_flags, CompilerStatus, ConnectionConfig, DaqClient, DaqClientBuilder, CLIENT_VERSION,
    DEFAULT_PORT,
};
pub use data::{Chunk, GridRecord, PollResult, SweepRecord};
pub use error::ZiError;
pub use logger::Logger;
pub use modules::{
    BandwidthControl, DaqConfig, DaqModule, DeviceSettings, DutSource, FftWindow, GridMode,
    MdsStatus, Module, ModuleKind, MultiDeviceSync, PidAdvice, PidAdvisor, PidAdvisorConfig,
    ScanMode, ScopeConfig, ScopeMode, ScopeModule, SweepConfig, SweepMapping, Sweeper,
    TriggerEdge, TriggerType,
};
pub use node::NodePath;
pub use types::{
    ApiLevel, DemodBurst, DemodSample, DeviceProps, ScopeRecord, SweepSample, ZiValue,
};
