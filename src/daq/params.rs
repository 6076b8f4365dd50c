use byteorder::ReadBytesExt;
use std::io::Cursor;

use super::DaqClient;
use crate::data;
use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::{Protocol, Tag};
use crate::types::{DemodSample, ZiValue};

impl DaqClient {
    /// Write an integer setting node.
    pub fn set_int(&mut self, path: &NodePath, value: i64) -> Result<(), ZiError> {
        self.transact(
            "Node.SetI",
            vec![ZiValue::String(path.to_string()), ZiValue::I64(value)],
            &[Tag::Str, Tag::I64],
            &[],
        )?;
        Ok(())
    }

    /// Write a floating-point setting node.
    pub fn set_double(&mut self, path: &NodePath, value: f64) -> Result<(), ZiError> {
        self.transact(
            "Node.SetD",
            vec![ZiValue::String(path.to_string()), ZiValue::F64(value)],
            &[Tag::Str, Tag::F64],
            &[],
        )?;
        Ok(())
    }

    /// Write a string setting node.
    pub fn set_string(&mut self, path: &NodePath, value: &str) -> Result<(), ZiError> {
        self.transact(
            "Node.SetS",
            vec![
                ZiValue::String(path.to_string()),
                ZiValue::String(value.to_string()),
            ],
            &[Tag::Str, Tag::Str],
            &[],
        )?;
        Ok(())
    }

    /// Write a vector-valued node, e.g. AWG waveform memory.
    pub fn set_vector_double(&mut self, path: &NodePath, values: &[f64]) -> Result<(), ZiError> {
        self.transact(
            "Node.SetV",
            vec![
                ZiValue::String(path.to_string()),
                ZiValue::VecF64(values.to_vec()),
            ],
            &[Tag::Str, Tag::VecF64],
            &[],
        )?;
        Ok(())
    }

    /// Apply a flat list of settings in order.
    ///
    /// This is the shape every example configures its signal path with: a
    /// batch of (path, value) pairs covering inputs, demodulators,
    /// oscillators and outputs.
    pub fn set(&mut self, settings: &[(NodePath, ZiValue)]) -> Result<(), ZiError> {
        for (path, value) in settings {
            match value {
                ZiValue::I32(v) => self.set_int(path, i64::from(*v))?,
                ZiValue::I64(v) => self.set_int(path, *v)?,
                ZiValue::U16(v) => self.set_int(path, i64::from(*v))?,
                ZiValue::U32(v) => self.set_int(path, i64::from(*v))?,
                ZiValue::F32(v) => self.set_double(path, f64::from(*v))?,
                ZiValue::F64(v) => self.set_double(path, *v)?,
                ZiValue::String(s) => self.set_string(path, s)?,
                ZiValue::VecF64(v) => self.set_vector_double(path, v)?,
                other => {
                    return Err(ZiError::Type(format!(
                        "Cannot write {other:?} to {path}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Read an integer setting node.
    pub fn get_int(&mut self, path: &NodePath) -> Result<i64, ZiError> {
        let result = self.transact(
            "Node.GetI",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[Tag::I64],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?
            .as_i64()
    }

    /// Read a floating-point setting node.
    pub fn get_double(&mut self, path: &NodePath) -> Result<f64, ZiError> {
        let result = self.transact(
            "Node.GetD",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[Tag::F64],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?
            .as_f64()
    }

    /// Read a string setting node.
    pub fn get_string(&mut self, path: &NodePath) -> Result<String, ZiError> {
        let result = self.transact(
            "Node.GetS",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[Tag::Str],
        )?;
        Ok(result
            .first()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?
            .as_str()?
            .to_string())
    }

    /// Read a vector-valued node.
    pub fn get_vector_double(&mut self, path: &NodePath) -> Result<Vec<f64>, ZiError> {
        let result = self.transact(
            "Node.GetV",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
            &[Tag::VecF64],
        )?;
        Ok(result
            .first()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?
            .as_f64_vec()?
            .to_vec())
    }

    /// Read all nodes matched by a (possibly wildcard) path.
    ///
    /// Returns (path, value) pairs; values are typed per node. An empty
    /// result means the pattern matched nothing.
    pub fn get(&mut self, path: &NodePath) -> Result<Vec<(NodePath, ZiValue)>, ZiError> {
        let body = self.transact_raw(
            "Node.Get",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
        )?;
        let mut cursor = Cursor::new(body.as_slice());
        let count = cursor.read_u32::<byteorder::BigEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let raw_path = Protocol::read_string(&mut cursor)?;
            let entry_path = NodePath::parse(&raw_path)?;
            let tag = match cursor.read_u8()? {
                0 => Tag::I64,
                1 => Tag::F64,
                2 => Tag::Str,
                3 => Tag::VecF64,
                other => {
                    return Err(ZiError::Protocol(format!(
                        "Unknown node value tag {other} at {entry_path}"
                    )))
                }
            };
            let value = Protocol::parse_value(&mut cursor, tag)?;
            entries.push((entry_path, value));
        }
        Protocol::parse_error_info(&body, cursor.position() as usize)?;
        Ok(entries)
    }

    /// List node paths below a branch.
    pub fn list_nodes(&mut self, path: &NodePath, recursive: bool) -> Result<Vec<NodePath>, ZiError> {
        let flags = u32::from(recursive);
        let result = self.transact(
            "Node.List",
            vec![ZiValue::String(path.to_string()), ZiValue::U32(flags)],
            &[Tag::Str, Tag::U32],
            &[Tag::VecStr],
        )?;
        result
            .first()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?
            .as_string_vec()?
            .iter()
            .map(|s| NodePath::parse(s))
            .collect()
    }

    /// Read one demodulator sample directly from a streaming node.
    ///
    /// For anything beyond a quick check, use subscribe/poll instead; this
    /// returns a single sample with no history.
    pub fn get_sample(&mut self, path: &NodePath) -> Result<DemodSample, ZiError> {
        let body = self.transact_raw(
            "Node.GetSample",
            vec![ZiValue::String(path.to_string())],
            &[Tag::Str],
        )?;
        let records = data::parse_records(&body)?;
        let burst = records.demod_samples(path)?;
        burst
            .samples
            .first()
            .copied()
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))
    }

    /// Global synchronization barrier between device and data server.
    ///
    /// Returns once all pending settings have taken effect on the device;
    /// also clears the session's streaming buffers so the next poll sees
    /// only fresh data.
    pub fn sync(&mut self) -> Result<(), ZiError> {
        self.transact("Session.Sync", vec![], &[], &[])?;
        Ok(())
    }
}
