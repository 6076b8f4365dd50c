use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use std::io::{Cursor, Read};

use crate::error::ZiError;
use crate::types::ZiValue;

pub const COMMAND_SIZE: usize = 32;
pub const HEADER_SIZE: usize = 40;
pub const ERROR_INFO_SIZE: usize = 8;
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;
pub const RESPONSE_FLAG: u16 = 1;

/// Wire encoding of one request argument or response field.
///
/// Vectors and strings are length-prefixed with a big-endian u32 count,
/// string vectors with a u32 entry count followed by length-prefixed
/// entries. All multi-byte quantities are big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    U16,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Str,
    VecU8,
    VecI32,
    VecF32,
    VecF64,
    VecStr,
}

#[derive(Debug, Clone)]
struct FrameHeader {
    command: [u8; COMMAND_SIZE],
    body_size: u32,
    flags: u16,
}

impl FrameHeader {
    fn new(command: &str, body_size: u32) -> Self {
        let mut cmd_bytes = [0u8; COMMAND_SIZE];
        let raw = command.as_bytes();
        let len = raw.len().min(COMMAND_SIZE);
        cmd_bytes[..len].copy_from_slice(&raw[..len]);
        Self {
            command: cmd_bytes,
            body_size,
            flags: RESPONSE_FLAG,
        }
    }

    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..COMMAND_SIZE].copy_from_slice(&self.command);
        buf[32..36].copy_from_slice(&self.body_size.to_be_bytes());
        buf[36..38].copy_from_slice(&self.flags.to_be_bytes());
        buf
    }
}

/// Low-level framing and payload codec.
pub struct Protocol;

impl Protocol {
    /// Build the 40-byte frame header for a command.
    pub fn command_header(command: &str, body_size: u32) -> [u8; HEADER_SIZE] {
        FrameHeader::new(command, body_size).to_bytes()
    }

    /// Check that the response echoes the expected command and return the
    /// response body size.
    pub fn validate_response_header(
        header: &[u8; HEADER_SIZE],
        expected_command: &str,
    ) -> Result<u32, ZiError> {
        let body_size = u32::from_be_bytes([header[32], header[33], header[34], header[35]]);
        let received = String::from_utf8_lossy(&header[0..COMMAND_SIZE])
            .trim_end_matches('\0')
            .to_string();
        if received == expected_command {
            Ok(body_size)
        } else {
            Err(ZiError::CommandMismatch {
                expected: expected_command.to_string(),
                actual: received,
            })
        }
    }

    /// Serialize one value according to its tag.
    pub fn serialize_value(
        value: &ZiValue,
        tag: Tag,
        buffer: &mut Vec<u8>,
    ) -> Result<(), ZiError> {
        match (value, tag) {
            (ZiValue::U16(v), Tag::U16) => buffer.write_u16::<BigEndian>(*v)?,
            (ZiValue::I32(v), Tag::I32) => buffer.write_i32::<BigEndian>(*v)?,
            (ZiValue::I64(v), Tag::I64) => buffer.write_i64::<BigEndian>(*v)?,
            (ZiValue::U32(v), Tag::U32) => buffer.write_u32::<BigEndian>(*v)?,
            (ZiValue::U64(v), Tag::U64) => buffer.write_u64::<BigEndian>(*v)?,
            (ZiValue::F32(v), Tag::F32) => buffer.write_f32::<BigEndian>(*v)?,
            (ZiValue::F64(v), Tag::F64) => buffer.write_f64::<BigEndian>(*v)?,
            (ZiValue::String(s), Tag::Str) => {
                buffer.write_u32::<BigEndian>(s.len() as u32)?;
                buffer.extend_from_slice(s.as_bytes());
            }
            (ZiValue::VecU8(v), Tag::VecU8) => {
                buffer.write_u32::<BigEndian>(v.len() as u32)?;
                buffer.extend_from_slice(v);
            }
            (ZiValue::VecI32(v), Tag::VecI32) => {
                buffer.write_u32::<BigEndian>(v.len() as u32)?;
                for item in v {
                    buffer.write_i32::<BigEndian>(*item)?;
                }
            }
            (ZiValue::VecF32(v), Tag::VecF32) => {
                buffer.write_u32::<BigEndian>(v.len() as u32)?;
                for item in v {
                    buffer.write_f32::<BigEndian>(*item)?;
                }
            }
            (ZiValue::VecF64(v), Tag::VecF64) => {
                buffer.write_u32::<BigEndian>(v.len() as u32)?;
                for item in v {
                    buffer.write_f64::<BigEndian>(*item)?;
                }
            }
            (ZiValue::VecString(v), Tag::VecStr) => {
                buffer.write_u32::<BigEndian>(v.len() as u32)?;
                for s in v {
                    buffer.write_u32::<BigEndian>(s.len() as u32)?;
                    buffer.extend_from_slice(s.as_bytes());
                }
            }
            (value, tag) => {
                return Err(ZiError::Type(format!(
                    "Cannot encode {value:?} as {tag:?}"
                )))
            }
        }
        Ok(())
    }

    /// Parse one tagged value from a cursor.
    pub fn parse_value(cursor: &mut Cursor<&[u8]>, tag: Tag) -> Result<ZiValue, ZiError> {
        let value = match tag {
            Tag::U16 => ZiValue::U16(cursor.read_u16::<BigEndian>()?),
            Tag::I32 => ZiValue::I32(cursor.read_i32::<BigEndian>()?),
            Tag::I64 => ZiValue::I64(cursor.read_i64::<BigEndian>()?),
            Tag::U32 => ZiValue::U32(cursor.read_u32::<BigEndian>()?),
            Tag::U64 => ZiValue::U64(cursor.read_u64::<BigEndian>()?),
            Tag::F32 => ZiValue::F32(cursor.read_f32::<BigEndian>()?),
            Tag::F64 => ZiValue::F64(cursor.read_f64::<BigEndian>()?),
            Tag::Str => ZiValue::String(Self::read_string(cursor)?),
            Tag::VecU8 => {
                let len = Self::read_len(cursor)?;
                let mut buf = vec![0u8; len];
                cursor.read_exact(&mut buf)?;
                ZiValue::VecU8(buf)
            }
            Tag::VecI32 => {
                let len = Self::read_len(cursor)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(cursor.read_i32::<BigEndian>()?);
                }
                ZiValue::VecI32(items)
            }
            Tag::VecF32 => {
                let len = Self::read_len(cursor)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(cursor.read_f32::<BigEndian>()?);
                }
                ZiValue::VecF32(items)
            }
            Tag::VecF64 => {
                let len = Self::read_len(cursor)?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(cursor.read_f64::<BigEndian>()?);
                }
                ZiValue::VecF64(items)
            }
            Tag::VecStr => {
                let count = Self::read_len(cursor)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::read_string(cursor)?);
                }
                ZiValue::VecString(items)
            }
        };
        Ok(value)
    }

    /// Parse a full response body: the tagged fields in order, then the
    /// optional error trailer. A non-empty trailer message wins over any
    /// parsed payload and surfaces as [`ZiError::ServerError`].
    pub fn parse_response(body: &[u8], tags: &[Tag]) -> Result<Vec<ZiValue>, ZiError> {
        let mut cursor = Cursor::new(body);
        let mut values = Vec::with_capacity(tags.len());
        for &tag in tags {
            values.push(Self::parse_value(&mut cursor, tag)?);
        }
        Self::parse_error_info(body, cursor.position() as usize)?;
        Ok(values)
    }

    /// Parse the error trailer, if any, starting at `data_end`.
    ///
    /// Trailer layout: i32 status, i32 message length, UTF-8 message.
    pub fn parse_error_info(body: &[u8], data_end: usize) -> Result<(), ZiError> {
        let trailer = match body.get(data_end..) {
            Some(section) if section.len() >= ERROR_INFO_SIZE => section,
            _ => return Ok(()),
        };

        let (status_bytes, rest) = trailer.split_at(4);
        let (len_bytes, message_bytes) = rest.split_at(4);

        let status = i32::from_be_bytes(
            status_bytes
                .try_into()
                .map_err(|_| ZiError::Protocol("Invalid error status".into()))?,
        );
        let message_len = i32::from_be_bytes(
            len_bytes
                .try_into()
                .map_err(|_| ZiError::Protocol("Invalid error length".into()))?,
        ) as usize;

        if message_len == 0 {
            return Ok(());
        }

        let message_slice = message_bytes
            .get(..message_len)
            .ok_or_else(|| ZiError::Protocol("Error message truncated".into()))?;
        let message = std::str::from_utf8(message_slice)
            .map_err(|_| ZiError::Protocol("Invalid UTF-8 in error message".into()))?
            .trim();

        if message.is_empty() {
            Ok(())
        } else {
            Err(ZiError::ServerError {
                code: status,
                message: message.to_string(),
            })
        }
    }

    /// Read an exact number of bytes, wrapping IO failures with context.
    pub fn read_exact_bytes<const N: usize>(reader: &mut dyn Read) -> Result<[u8; N], ZiError> {
        let mut buf = [0u8; N];
        reader.read_exact(&mut buf).map_err(|e| ZiError::Io {
            source: e,
            context: format!("reading {N} bytes from data server"),
        })?;
        Ok(buf)
    }

    /// Read a variable-length body with a size cap.
    pub fn read_body(reader: &mut dyn Read, size: usize) -> Result<Vec<u8>, ZiError> {
        if size > MAX_BODY_SIZE {
            return Err(ZiError::Protocol(format!(
                "Response body size {size} exceeds maximum {MAX_BODY_SIZE}"
            )));
        }
        debug!("reading {size} byte response body");
        let mut body = vec![0u8; size];
        reader.read_exact(&mut body).map_err(|e| ZiError::Io {
            source: e,
            context: format!("reading {size} byte response body"),
        })?;
        Ok(body)
    }

    fn read_len(cursor: &mut Cursor<&[u8]>) -> Result<usize, ZiError> {
        let len = cursor.read_u32::<BigEndian>()? as usize;
        if len > MAX_BODY_SIZE {
            return Err(ZiError::Protocol(format!(
                "Declared length {len} exceeds maximum {MAX_BODY_SIZE}"
            )));
        }
        Ok(len)
    }

    pub(crate) fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, ZiError> {
        let len = Self::read_len(cursor)?;
        let mut buf = vec![0u8; len];
        cursor.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| ZiError::Protocol("Invalid UTF-8 in string".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_validation() {
        let header = Protocol::command_header("Node.GetD", 16);
        let size = Protocol::validate_response_header(&header, "Node.GetD").unwrap();
        assert_eq!(size, 16);
    }

    #[test]
    fn mismatched_command_is_rejected() {
        let header = Protocol::command_header("Node.GetD", 0);
        let err = Protocol::validate_response_header(&header, "Node.SetD").unwrap_err();
        assert!(matches!(err, ZiError::CommandMismatch { .. }));
    }

    #[test]
    fn scalar_and_vector_values_round_trip() {
        let values = vec![
            (ZiValue::I64(-42), Tag::I64),
            (ZiValue::F64(1.25), Tag::F64),
            (ZiValue::String("dev2006".into()), Tag::Str),
            (ZiValue::VecF64(vec![0.5, -0.5]), Tag::VecF64),
            (
                ZiValue::VecString(vec!["a".into(), "bc".into()]),
                Tag::VecStr,
            ),
        ];
        let mut body = Vec::new();
        for (value, tag) in &values {
            Protocol::serialize_value(value, *tag, &mut body).unwrap();
        }
        let tags: Vec<Tag> = values.iter().map(|(_, t)| *t).collect();
        let parsed = Protocol::parse_response(&body, &tags).unwrap();
        let expected: Vec<ZiValue> = values.into_iter().map(|(v, _)| v).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn error_trailer_surfaces_as_server_error() {
        let mut body = Vec::new();
        Protocol::serialize_value(&ZiValue::I32(0), Tag::I32, &mut body).unwrap();
        let message = b"node not found";
        body.extend_from_slice(&(-32601i32).to_be_bytes());
        body.extend_from_slice(&(message.len() as i32).to_be_bytes());
        body.extend_from_slice(message);

        let err = Protocol::parse_response(&body, &[Tag::I32]).unwrap_err();
        match err {
            ZiError::ServerError { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "node not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_trailer_is_not_an_error() {
        let mut body = Vec::new();
        Protocol::serialize_value(&ZiValue::F64(2.0), Tag::F64, &mut body).unwrap();
        let parsed = Protocol::parse_response(&body, &[Tag::F64]).unwrap();
        assert_eq!(parsed, vec![ZiValue::F64(2.0)]);
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        let mut body = Vec::new();
        body.extend_from_slice(&(u32::MAX).to_be_bytes());
        let err = Protocol::parse_response(&body, &[Tag::VecF64]).unwrap_err();
        assert!(matches!(err, ZiError::Protocol(_)));
    }
}
