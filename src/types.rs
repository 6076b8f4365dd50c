use serde::{Deserialize, Serialize};

use crate::error::ZiError;

/// Runtime-tagged value travelling over the data-server protocol.
///
/// Every request argument and response field is one of these variants;
/// the protocol layer pairs them with a [`crate::protocol::Tag`] that
/// fixes the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ZiValue {
    U16(u16),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    VecU8(Vec<u8>),
    VecI32(Vec<i32>),
    VecF32(Vec<f32>),
    VecF64(Vec<f64>),
    VecString(Vec<String>),
}

impl From<u16> for ZiValue {
    fn from(value: u16) -> Self {
        ZiValue::U16(value)
    }
}

impl From<i32> for ZiValue {
    fn from(value: i32) -> Self {
        ZiValue::I32(value)
    }
}

impl From<i64> for ZiValue {
    fn from(value: i64) -> Self {
        ZiValue::I64(value)
    }
}

impl From<u32> for ZiValue {
    fn from(value: u32) -> Self {
        ZiValue::U32(value)
    }
}

impl From<u64> for ZiValue {
    fn from(value: u64) -> Self {
        ZiValue::U64(value)
    }
}

impl From<f32> for ZiValue {
    fn from(value: f32) -> Self {
        ZiValue::F32(value)
    }
}

impl From<f64> for ZiValue {
    fn from(value: f64) -> Self {
        ZiValue::F64(value)
    }
}

impl From<&str> for ZiValue {
    fn from(value: &str) -> Self {
        ZiValue::String(value.to_string())
    }
}

impl From<String> for ZiValue {
    fn from(value: String) -> Self {
        ZiValue::String(value)
    }
}

impl From<Vec<f64>> for ZiValue {
    fn from(value: Vec<f64>) -> Self {
        ZiValue::VecF64(value)
    }
}

impl From<Vec<i32>> for ZiValue {
    fn from(value: Vec<i32>) -> Self {
        ZiValue::VecI32(value)
    }
}

impl From<Vec<String>> for ZiValue {
    fn from(value: Vec<String>) -> Self {
        ZiValue::VecString(value)
    }
}

impl ZiValue {
    pub fn as_u16(&self) -> Result<u16, ZiError> {
        match self {
            ZiValue::U16(v) => Ok(*v),
            _ => Err(ZiError::Type(format!("Expected u16, got {self:?}"))),
        }
    }

    pub fn as_i32(&self) -> Result<i32, ZiError> {
        match self {
            ZiValue::I32(v) => Ok(*v),
            _ => Err(ZiError::Type(format!("Expected i32, got {self:?}"))),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ZiError> {
        match self {
            ZiValue::I64(v) => Ok(*v),
            ZiValue::I32(v) => Ok(i64::from(*v)),
            _ => Err(ZiError::Type(format!("Expected i64, got {self:?}"))),
        }
    }

    pub fn as_u32(&self) -> Result<u32, ZiError> {
        match self {
            ZiValue::U32(v) => Ok(*v),
            _ => Err(ZiError::Type(format!("Expected u32, got {self:?}"))),
        }
    }

    pub fn as_u64(&self) -> Result<u64, ZiError> {
        match self {
            ZiValue::U64(v) => Ok(*v),
            _ => Err(ZiError::Type(format!("Expected u64, got {self:?}"))),
        }
    }

    pub fn as_f32(&self) -> Result<f32, ZiError> {
        match self {
            ZiValue::F32(v) => Ok(*v),
            _ => Err(ZiError::Type(format!("Expected f32, got {self:?}"))),
        }
    }

    pub fn as_f64(&self) -> Result<f64, ZiError> {
        match self {
            ZiValue::F64(v) => Ok(*v),
            ZiValue::F32(v) => Ok(f64::from(*v)),
            _ => Err(ZiError::Type(format!("Expected f64, got {self:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<&str, ZiError> {
        match self {
            ZiValue::String(s) => Ok(s),
            _ => Err(ZiError::Type(format!("Expected string, got {self:?}"))),
        }
    }

    pub fn as_f64_vec(&self) -> Result<&[f64], ZiError> {
        match self {
            ZiValue::VecF64(v) => Ok(v),
            _ => Err(ZiError::Type(format!("Expected f64 vector, got {self:?}"))),
        }
    }

    pub fn as_i32_vec(&self) -> Result<&[i32], ZiError> {
        match self {
            ZiValue::VecI32(v) => Ok(v),
            _ => Err(ZiError::Type(format!("Expected i32 vector, got {self:?}"))),
        }
    }

    pub fn as_u8_vec(&self) -> Result<&[u8], ZiError> {
        match self {
            ZiValue::VecU8(v) => Ok(v),
            _ => Err(ZiError::Type(format!("Expected byte vector, got {self:?}"))),
        }
    }

    pub fn as_string_vec(&self) -> Result<&[String], ZiError> {
        match self {
            ZiValue::VecString(v) => Ok(v),
            _ => Err(ZiError::Type(format!(
                "Expected string vector, got {self:?}"
            ))),
        }
    }
}

/// Protocol compatibility level negotiated during `Session.Hello`.
///
/// HF2-class servers only speak level 1; all current servers speak level 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiLevel {
    One,
    Six,
}

impl ApiLevel {
    pub fn as_u32(self) -> u32 {
        match self {
            ApiLevel::One => 1,
            ApiLevel::Six => 6,
        }
    }
}

impl TryFrom<u32> for ApiLevel {
    type Error = ZiError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ApiLevel::One),
            6 => Ok(ApiLevel::Six),
            other => Err(ZiError::InvalidArgument(format!(
                "Unsupported API level {other}, expected 1 or 6"
            ))),
        }
    }
}

/// Discovery properties of a connected device.
///
/// The capability set discovered when a device is bound to the session:
/// instrument family, installed options and the interface it was reached
/// over. Scripts use it to gate examples on required hardware features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProps {
    /// Device serial, e.g. "dev2006".
    pub serial: String,
    /// Instrument family string, e.g. "MFLI", "UHFLI", "HDAWG".
    pub devtype: String,
    /// Installed option codes, e.g. "AWG", "DIG", "MD".
    pub options: Vec<String>,
    /// Interfaces the device is reachable over, e.g. "1GbE", "USB".
    pub interfaces: Vec<String>,
    /// Ticks per second of the device timebase.
    pub clockbase: f64,
}

impl DeviceProps {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(option))
    }
}

/// One demodulator output sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemodSample {
    /// Device timestamp in clockbase ticks.
    pub timestamp: u64,
    pub x: f64,
    pub y: f64,
    pub frequency: f64,
    pub phase: f64,
    pub dio: u32,
    pub trigger: u32,
    pub aux_in0: f64,
    pub aux_in1: f64,
}

impl DemodSample {
    /// Demodulator magnitude R = |x + iy|.
    pub fn r(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Demodulator phase angle atan2(y, x) in radians.
    pub fn theta(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// A contiguous burst of demodulator samples returned by one poll chunk.
#[derive(Debug, Clone, Default)]
pub struct DemodBurst {
    pub samples: Vec<DemodSample>,
    /// Set when the server detected sample loss for this subscription.
    pub data_loss: bool,
}

/// One scope shot: a fixed-length wave per enabled channel.
#[derive(Debug, Clone)]
pub struct ScopeRecord {
    /// Timestamp of the trigger point in clockbase ticks.
    pub timestamp: u64,
    /// Sampling interval in seconds.
    pub dt: f64,
    /// Per-channel wave data, all channels the same length.
    pub channels: Vec<Vec<f64>>,
    /// Number of segments this record was captured with.
    pub segments: u32,
    pub data_loss: bool,
    pub overrange: bool,
}

impl ScopeRecord {
    pub fn length(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// One averaged point of a sweep: the grid value the sweeper set plus the
/// demodulator quantities it measured there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepSample {
    /// Swept node value at this point (e.g. oscillator frequency in Hz).
    pub grid: f64,
    pub x: f64,
    pub y: f64,
    /// Demodulation bandwidth used at this point.
    pub bandwidth: f64,
    /// Number of raw samples averaged into this point.
    pub count: u32,
}

impl SweepSample {
    pub fn r(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn theta(&self) -> f64 {
        self.y.atan2(self.x)
    }
}
