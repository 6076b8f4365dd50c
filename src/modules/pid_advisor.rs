use log::{debug, info};
use std::time::Duration;

use super::{Module, ModuleKind};
use crate::daq::DaqClient;
use crate::error::ZiError;
use crate::utils::{poll_until, PollError};

/// Plant model the advisor optimizes the loop against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutSource {
    LowpassFirstOrder,
    LowpassSecondOrder,
    ResonatorFrequency,
    /// Device-internal PLL; device-specific fields like delay are taken
    /// from the instrument itself.
    InternalPll,
    Vco,
    ResonatorAmplitude,
}

impl DutSource {
    fn code(self) -> i64 {
        match self {
            DutSource::LowpassFirstOrder => 1,
            DutSource::LowpassSecondOrder => 2,
            DutSource::ResonatorFrequency => 3,
            DutSource::InternalPll => 4,
            DutSource::Vco => 5,
            DutSource::ResonatorAmplitude => 6,
        }
    }
}

mod pid_mode {
    /// Optimize the proportional gain.
    pub const P: i64 = 1;
    /// Optimize the integral gain.
    pub const I: i64 = 2;
    /// Optimize the derivative gain.
    pub const D: i64 = 4;
}

#[derive(Debug, Clone)]
pub struct PidAdvisorConfig {
    pub device: String,
    /// Index of the PID / PLL on the device the advice is for.
    pub index: u32,
    pub dut_source: DutSource,
    /// Loop delay in seconds; ignored for [`DutSource::InternalPll`].
    pub dut_delay: f64,
    /// Closed-loop target bandwidth, Hz.
    pub target_bandwidth: f64,
    pub optimize_p: bool,
    pub optimize_i: bool,
    pub optimize_d: bool,
}

impl Default for PidAdvisorConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            index: 0,
            dut_source: DutSource::InternalPll,
            dut_delay: 0.0,
            target_bandwidth: 10e3,
            optimize_p: true,
            optimize_i: true,
            optimize_d: true,
        }
    }
}

/// Gains and achieved bandwidth returned by a finished advise run.
#[derive(Debug, Clone, Copy)]
pub struct PidAdvice {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    /// Simulated closed-loop bandwidth, Hz.
    pub bandwidth: f64,
}

/// PID advisor module: simulates the closed loop against a plant model
/// and optimizes the controller gains for a target bandwidth.
pub struct PidAdvisor<'a> {
    module: Module<'a>,
}

impl<'a> PidAdvisor<'a> {
    pub fn new(client: &'a mut DaqClient) -> Result<Self, ZiError> {
        Ok(Self {
            module: client.module(ModuleKind::PidAdvisor)?,
        })
    }

    pub fn configure(&mut self, config: &PidAdvisorConfig) -> Result<(), ZiError> {
        if config.device.is_empty() {
            return Err(ZiError::InvalidArgument(
                "PidAdvisorConfig.device must be set".to_string(),
            ));
        }
        if config.target_bandwidth <= 0.0 {
            return Err(ZiError::InvalidArgument(format!(
                "target bandwidth must be positive, got {}",
                config.target_bandwidth
            )));
        }
        let mut mode = 0;
        if config.optimize_p {
            mode |= pid_mode::P;
        }
        if config.optimize_i {
            mode |= pid_mode::I;
        }
        if config.optimize_d {
            mode |= pid_mode::D;
        }
        if mode == 0 {
            return Err(ZiError::InvalidArgument(
                "at least one of P, I, D must be optimized".to_string(),
            ));
        }

        self.module.set_string("device", &config.device)?;
        // Keep the device untouched until the advice is transferred
        // explicitly.
        self.module.set_int("auto", 0)?;
        self.module.set_int("index", i64::from(config.index))?;
        self.module
            .set_int("dut/source", config.dut_source.code())?;
        if config.dut_source != DutSource::InternalPll {
            self.module.set_double("dut/delay", config.dut_delay)?;
        }
        self.module
            .set_double("pid/targetbw", config.target_bandwidth)?;
        self.module.set_int("pid/mode", mode)?;
        // Start the optimization from scratch.
        self.module.set_double("pid/p", 0.0)?;
        self.module.set_double("pid/i", 0.0)?;
        self.module.set_double("pid/d", 0.0)?;
        Ok(())
    }

    /// Run the advise calculation and wait for it to converge. Advising
    /// against a PLL model can take over a minute.
    pub fn advise(&mut self, timeout: Duration) -> Result<PidAdvice, ZiError> {
        self.module.execute()?;
        self.module.set_int("calculate", 1)?;
        info!("Advising, this can take a while");

        let module = &mut self.module;
        let outcome = poll_until(
            || {
                let done = module.get_int("calculate")? == 0;
                if !done {
                    debug!("Advisor still calculating");
                }
                Ok::<bool, ZiError>(done)
            },
            timeout,
            Duration::from_millis(500),
        );
        match outcome {
            Ok(()) => {}
            Err(PollError::Timeout) => {
                // Stop the calculation so the module is reusable.
                self.module.finish()?;
                return Err(ZiError::Timeout);
            }
            Err(PollError::ConditionError(e)) => return Err(e),
        }

        let advice = PidAdvice {
            p: self.module.get_double("pid/p")?,
            i: self.module.get_double("pid/i")?,
            d: self.module.get_double("pid/d")?,
            bandwidth: self.module.get_double("bw")?,
        };
        info!(
            "Advised P = {:.3}, I = {:.3}, D = {:.6}, bandwidth = {:.1} Hz",
            advice.p, advice.i, advice.d, advice.bandwidth
        );
        Ok(advice)
    }

    /// Transfer the current advice to the device PID it was computed for.
    pub fn to_device(&mut self) -> Result<(), ZiError> {
        self.module.set_int("todevice", 1)?;
        self.module.client().sync()
    }

    pub fn finish(&mut self) -> Result<(), ZiError> {
        self.module.finish()
    }
}
