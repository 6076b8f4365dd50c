use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error::ZiError;
use crate::node::NodePath;
use crate::protocol::Protocol;
use crate::types::{DemodBurst, DemodSample, ScopeRecord};

const KIND_DEMOD: u16 = 0;
const KIND_SCOPE: u16 = 1;
const KIND_SWEEP: u16 = 2;
const KIND_GRID: u16 = 3;
const KIND_SCALAR: u16 = 4;

const FLAG_DATA_LOSS: u8 = 0x01;
const FLAG_OVERRANGE: u8 = 0x02;
const FLAG_FINISHED: u8 = 0x01;

/// One completed sweep loop for one subscribed path, as column arrays.
#[derive(Debug, Clone, Default)]
pub struct SweepRecord {
    pub grid: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub bandwidth: Vec<f64>,
    pub count: Vec<u32>,
}

impl SweepRecord {
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// Magnitude per sweep point, R = |x + iy|.
    pub fn r(&self) -> Vec<f64> {
        self.x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| x.hypot(*y))
            .collect()
    }

    /// Phase angle per sweep point in radians.
    pub fn theta(&self) -> Vec<f64> {
        self.x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| y.atan2(*x))
            .collect()
    }
}

/// One readout of the data-acquisition module's trigger grid.
#[derive(Debug, Clone)]
pub struct GridRecord {
    /// Rows are repetitions/triggers, columns are grid samples.
    pub values: Array2<f64>,
    /// Whether the grid was complete when read.
    pub finished: bool,
}

/// One decoded record chunk for a subscribed path.
#[derive(Debug, Clone)]
pub enum Chunk {
    Demod(DemodBurst),
    Scope(ScopeRecord),
    Sweep(SweepRecord),
    Grid(GridRecord),
    Scalar(Vec<f64>),
}

/// Data returned by `poll` or a module `read`: everything the server
/// accumulated for the subscribed paths, keyed by node path. Can be
/// empty, e.g. when a demodulator is disabled or its rate is zero.
#[derive(Debug, Clone, Default)]
pub struct PollResult {
    chunks: BTreeMap<NodePath, Vec<Chunk>>,
}

impl PollResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &NodePath> {
        self.chunks.keys()
    }

    pub fn chunks(&self, path: &NodePath) -> Option<&[Chunk]> {
        self.chunks.get(path).map(Vec::as_slice)
    }

    /// All demod samples for `path`, concatenated across chunks into one
    /// flat burst in arrival order.
    pub fn demod_samples(&self, path: &NodePath) -> Result<DemodBurst, ZiError> {
        let chunks = self
            .chunks
            .get(path)
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?;
        let mut burst = DemodBurst::default();
        for chunk in chunks {
            match chunk {
                Chunk::Demod(b) => {
                    burst.samples.extend_from_slice(&b.samples);
                    burst.data_loss |= b.data_loss;
                }
                other => {
                    return Err(ZiError::Type(format!(
                        "Expected demod data at {path}, got {other:?}"
                    )))
                }
            }
        }
        Ok(burst)
    }

    pub fn scope_records(&self, path: &NodePath) -> Result<Vec<&ScopeRecord>, ZiError> {
        let chunks = self
            .chunks
            .get(path)
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?;
        chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Scope(r) => Ok(r),
                other => Err(ZiError::Type(format!(
                    "Expected scope data at {path}, got {other:?}"
                ))),
            })
            .collect()
    }

    pub fn sweep_records(&self, path: &NodePath) -> Result<Vec<&SweepRecord>, ZiError> {
        let chunks = self
            .chunks
            .get(path)
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?;
        chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Sweep(r) => Ok(r),
                other => Err(ZiError::Type(format!(
                    "Expected sweep data at {path}, got {other:?}"
                ))),
            })
            .collect()
    }

    pub fn grid_records(&self, path: &NodePath) -> Result<Vec<&GridRecord>, ZiError> {
        let chunks = self
            .chunks
            .get(path)
            .ok_or_else(|| ZiError::MissingNode(path.to_string()))?;
        chunks
            .iter()
            .map(|chunk| match chunk {
                Chunk::Grid(r) => Ok(r),
                other => Err(ZiError::Type(format!(
                    "Expected grid data at {path}, got {other:?}"
                ))),
            })
            .collect()
    }

    /// Whether no subscription reported sample loss.
    pub fn lossless(&self) -> bool {
        self.chunks.values().flatten().all(|chunk| match chunk {
            Chunk::Demod(b) => !b.data_loss,
            Chunk::Scope(r) => !r.data_loss,
            _ => true,
        })
    }

    /// Merge another result into this one, preserving arrival order.
    pub fn merge(&mut self, other: PollResult) {
        for (path, mut chunks) in other.chunks {
            self.chunks.entry(path).or_default().append(&mut chunks);
        }
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, path: NodePath, chunk: Chunk) {
        self.chunks.entry(path).or_default().push(chunk);
    }
}

/// Decode a `Stream.Poll` / `Module.Read` response body.
///
/// Layout: u32 chunk count, then per chunk a length-prefixed path, a u16
/// kind discriminant and the kind-specific payload; the standard error
/// trailer follows the last chunk.
pub fn parse_records(body: &[u8]) -> Result<PollResult, ZiError> {
    let mut cursor = Cursor::new(body);
    let count = cursor.read_u32::<BigEndian>()?;
    let mut result = PollResult::default();
    for _ in 0..count {
        let raw_path = Protocol::read_string(&mut cursor)?;
        let path = NodePath::parse(&raw_path)?;
        let kind = cursor.read_u16::<BigEndian>()?;
        let chunk = parse_chunk(&mut cursor, kind)?;
        result.chunks.entry(path).or_default().push(chunk);
    }
    Protocol::parse_error_info(body, cursor.position() as usize)?;
    Ok(result)
}

/// Guard a declared element count against the bytes actually left in the
/// body before allocating.
fn checked_count(cursor: &Cursor<&[u8]>, count: usize, elem_size: usize) -> Result<usize, ZiError> {
    let remaining = cursor
        .get_ref()
        .len()
        .saturating_sub(cursor.position() as usize);
    match count.checked_mul(elem_size) {
        Some(needed) if needed <= remaining => Ok(count),
        _ => Err(ZiError::Protocol(format!(
            "Declared {count} elements but only {remaining} bytes remain"
        ))),
    }
}

const DEMOD_SAMPLE_SIZE: usize = 64;
const SWEEP_POINT_SIZE: usize = 36;

fn parse_chunk(cursor: &mut Cursor<&[u8]>, kind: u16) -> Result<Chunk, ZiError> {
    match kind {
        KIND_DEMOD => {
            let flags = cursor.read_u8()?;
            let count = cursor.read_u32::<BigEndian>()? as usize;
            let count = checked_count(cursor, count, DEMOD_SAMPLE_SIZE)?;
            let mut samples = Vec::with_capacity(count);
            for _ in 0..count {
                samples.push(DemodSample {
                    timestamp: cursor.read_u64::<BigEndian>()?,
                    x: cursor.read_f64::<BigEndian>()?,
                    y: cursor.read_f64::<BigEndian>()?,
                    frequency: cursor.read_f64::<BigEndian>()?,
                    phase: cursor.read_f64::<BigEndian>()?,
                    dio: cursor.read_u32::<BigEndian>()?,
                    trigger: cursor.read_u32::<BigEndian>()?,
                    aux_in0: cursor.read_f64::<BigEndian>()?,
                    aux_in1: cursor.read_f64::<BigEndian>()?,
                });
            }
            Ok(Chunk::Demod(DemodBurst {
                samples,
                data_loss: flags & FLAG_DATA_LOSS != 0,
            }))
        }
        KIND_SCOPE => {
            let timestamp = cursor.read_u64::<BigEndian>()?;
            let dt = cursor.read_f64::<BigEndian>()?;
            let segments = cursor.read_u32::<BigEndian>()?;
            let flags = cursor.read_u8()?;
            let channel_count = cursor.read_u32::<BigEndian>()? as usize;
            let length = cursor.read_u32::<BigEndian>()? as usize;
            let cells = channel_count.checked_mul(length).unwrap_or(usize::MAX);
            checked_count(cursor, cells, 8)?;
            let mut channels = Vec::with_capacity(channel_count);
            for _ in 0..channel_count {
                let mut wave = Vec::with_capacity(length);
                for _ in 0..length {
                    wave.push(cursor.read_f64::<BigEndian>()?);
                }
                channels.push(wave);
            }
            Ok(Chunk::Scope(ScopeRecord {
                timestamp,
                dt,
                channels,
                segments,
                data_loss: flags & FLAG_DATA_LOSS != 0,
                overrange: flags & FLAG_OVERRANGE != 0,
            }))
        }
        KIND_SWEEP => {
            let count = cursor.read_u32::<BigEndian>()? as usize;
            let count = checked_count(cursor, count, SWEEP_POINT_SIZE)?;
            let mut record = SweepRecord::default();
            for _ in 0..count {
                record.grid.push(cursor.read_f64::<BigEndian>()?);
                record.x.push(cursor.read_f64::<BigEndian>()?);
                record.y.push(cursor.read_f64::<BigEndian>()?);
                record.bandwidth.push(cursor.read_f64::<BigEndian>()?);
                record.count.push(cursor.read_u32::<BigEndian>()?);
            }
            Ok(Chunk::Sweep(record))
        }
        KIND_GRID => {
            let rows = cursor.read_u32::<BigEndian>()? as usize;
            let cols = cursor.read_u32::<BigEndian>()? as usize;
            let flags = cursor.read_u8()?;
            let cells = rows.checked_mul(cols).unwrap_or(usize::MAX);
            checked_count(cursor, cells, 8)?;
            let mut flat = Vec::with_capacity(cells);
            for _ in 0..cells {
                flat.push(cursor.read_f64::<BigEndian>()?);
            }
            let values = Array2::from_shape_vec((rows, cols), flat)
                .map_err(|e| ZiError::Protocol(format!("Bad grid shape: {e}")))?;
            Ok(Chunk::Grid(GridRecord {
                values,
                finished: flags & FLAG_FINISHED != 0,
            }))
        }
        KIND_SCALAR => {
            let count = cursor.read_u32::<BigEndian>()? as usize;
            let count = checked_count(cursor, count, 8)?;
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(cursor.read_f64::<BigEndian>()?);
            }
            Ok(Chunk::Scalar(values))
        }
        other => Err(ZiError::Protocol(format!("Unknown chunk kind {other}"))),
    }
}

/// Encode record chunks into a `Stream.Poll` response body.
///
/// The inverse of [`parse_records`]; used by server-side mocks in tests.
pub fn encode_records(records: &[(NodePath, Chunk)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for (path, chunk) in records {
        let path_str = path.as_str();
        body.extend_from_slice(&(path_str.len() as u32).to_be_bytes());
        body.extend_from_slice(path_str.as_bytes());
        encode_chunk(chunk, &mut body);
    }
    body
}

fn encode_chunk(chunk: &Chunk, body: &mut Vec<u8>) {
    match chunk {
        Chunk::Demod(burst) => {
            let _ = body.write_u16::<BigEndian>(KIND_DEMOD);
            let flags = if burst.data_loss { FLAG_DATA_LOSS } else { 0 };
            let _ = body.write_u8(flags);
            let _ = body.write_u32::<BigEndian>(burst.samples.len() as u32);
            for s in &burst.samples {
                let _ = body.write_u64::<BigEndian>(s.timestamp);
                let _ = body.write_f64::<BigEndian>(s.x);
                let _ = body.write_f64::<BigEndian>(s.y);
                let _ = body.write_f64::<BigEndian>(s.frequency);
                let _ = body.write_f64::<BigEndian>(s.phase);
                let _ = body.write_u32::<BigEndian>(s.dio);
                let _ = body.write_u32::<BigEndian>(s.trigger);
                let _ = body.write_f64::<BigEndian>(s.aux_in0);
                let _ = body.write_f64::<BigEndian>(s.aux_in1);
            }
        }
        Chunk::Scope(record) => {
            let _ = body.write_u16::<BigEndian>(KIND_SCOPE);
            let _ = body.write_u64::<BigEndian>(record.timestamp);
            let _ = body.write_f64::<BigEndian>(record.dt);
            let _ = body.write_u32::<BigEndian>(record.segments);
            let mut flags = 0u8;
            if record.data_loss {
                flags |= FLAG_DATA_LOSS;
            }
            if record.overrange {
                flags |= FLAG_OVERRANGE;
            }
            let _ = body.write_u8(flags);
            let _ = body.write_u32::<BigEndian>(record.channels.len() as u32);
            let _ = body.write_u32::<BigEndian>(record.length() as u32);
            for wave in &record.channels {
                for v in wave {
                    let _ = body.write_f64::<BigEndian>(*v);
                }
            }
        }
        Chunk::Sweep(record) => {
            let _ = body.write_u16::<BigEndian>(KIND_SWEEP);
            let _ = body.write_u32::<BigEndian>(record.len() as u32);
            for i in 0..record.len() {
                let _ = body.write_f64::<BigEndian>(record.grid[i]);
                let _ = body.write_f64::<BigEndian>(record.x[i]);
                let _ = body.write_f64::<BigEndian>(record.y[i]);
                let _ = body.write_f64::<BigEndian>(record.bandwidth[i]);
                let _ = body.write_u32::<BigEndian>(record.count[i]);
            }
        }
        Chunk::Grid(record) => {
            let _ = body.write_u16::<BigEndian>(KIND_GRID);
            let (rows, cols) = record.values.dim();
            let _ = body.write_u32::<BigEndian>(rows as u32);
            let _ = body.write_u32::<BigEndian>(cols as u32);
            let _ = body.write_u8(if record.finished { FLAG_FINISHED } else { 0 });
            for v in record.values.iter() {
                let _ = body.write_f64::<BigEndian>(*v);
            }
        }
        Chunk::Scalar(values) => {
            let _ = body.write_u16::<BigEndian>(KIND_SCALAR);
            let _ = body.write_u32::<BigEndian>(values.len() as u32);
            for v in values {
                let _ = body.write_f64::<BigEndian>(*v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, x: f64, y: f64) -> DemodSample {
        DemodSample {
            timestamp: ts,
            x,
            y,
            frequency: 400e3,
            phase: 0.0,
            dio: 0,
            trigger: 0,
            aux_in0: 0.0,
            aux_in1: 0.0,
        }
    }

    #[test]
    fn demod_records_round_trip() {
        let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
        let burst = DemodBurst {
            samples: vec![sample(10, 1.0, 2.0), sample(20, 3.0, 4.0)],
            data_loss: false,
        };
        let body = encode_records(&[(path.clone(), Chunk::Demod(burst))]);
        let result = parse_records(&body).unwrap();
        let flat = result.demod_samples(&path).unwrap();
        assert_eq!(flat.samples.len(), 2);
        assert_eq!(flat.samples[1].timestamp, 20);
        assert!(result.lossless());
    }

    #[test]
    fn chunks_for_the_same_path_concatenate_in_order() {
        let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
        let body = encode_records(&[
            (
                path.clone(),
                Chunk::Demod(DemodBurst {
                    samples: vec![sample(1, 0.0, 0.0)],
                    data_loss: false,
                }),
            ),
            (
                path.clone(),
                Chunk::Demod(DemodBurst {
                    samples: vec![sample(2, 0.0, 0.0)],
                    data_loss: true,
                }),
            ),
        ]);
        let result = parse_records(&body).unwrap();
        let flat = result.demod_samples(&path).unwrap();
        let timestamps: Vec<u64> = flat.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1, 2]);
        assert!(flat.data_loss);
        assert!(!result.lossless());
    }

    #[test]
    fn oversized_declared_grid_is_rejected() {
        // A 20-ish byte body claiming a u32::MAX x u32::MAX grid must
        // fail cleanly instead of trying to allocate it.
        let path = "/dev2006/demods/0/sample";
        let mut body = Vec::new();
        let _ = body.write_u32::<BigEndian>(1);
        let _ = body.write_u32::<BigEndian>(path.len() as u32);
        body.extend_from_slice(path.as_bytes());
        let _ = body.write_u16::<BigEndian>(KIND_GRID);
        let _ = body.write_u32::<BigEndian>(u32::MAX);
        let _ = body.write_u32::<BigEndian>(u32::MAX);
        let _ = body.write_u8(0);
        assert!(matches!(parse_records(&body), Err(ZiError::Protocol(_))));
    }

    #[test]
    fn oversized_declared_sample_count_is_rejected() {
        let path = "/dev2006/demods/0/sample";
        let mut body = Vec::new();
        let _ = body.write_u32::<BigEndian>(1);
        let _ = body.write_u32::<BigEndian>(path.len() as u32);
        body.extend_from_slice(path.as_bytes());
        let _ = body.write_u16::<BigEndian>(KIND_DEMOD);
        let _ = body.write_u8(0);
        let _ = body.write_u32::<BigEndian>(u32::MAX);
        assert!(matches!(parse_records(&body), Err(ZiError::Protocol(_))));
    }

    #[test]
    fn missing_path_is_reported() {
        let result = PollResult::default();
        let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
        assert!(matches!(
            result.demod_samples(&path),
            Err(ZiError::MissingNode(_))
        ));
    }

    #[test]
    fn scope_record_round_trips() {
        let path = NodePath::parse("/dev2006/scopes/0/wave").unwrap();
        let record = ScopeRecord {
            timestamp: 99,
            dt: 1.0 / 60e6,
            channels: vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]],
            segments: 1,
            data_loss: false,
            overrange: true,
        };
        let body = encode_records(&[(path.clone(), Chunk::Scope(record))]);
        let result = parse_records(&body).unwrap();
        let records = result.scope_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].length(), 3);
        assert_eq!(records[0].channels.len(), 2);
        assert!(records[0].overrange);
    }

    #[test]
    fn sweep_record_round_trips_and_derives_magnitude() {
        let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
        let record = SweepRecord {
            grid: vec![1e3, 1e4],
            x: vec![3.0, 0.0],
            y: vec![4.0, 1.0],
            bandwidth: vec![10.0, 10.0],
            count: vec![100, 100],
        };
        let body = encode_records(&[(path.clone(), Chunk::Sweep(record))]);
        let result = parse_records(&body).unwrap();
        let records = result.sweep_records(&path).unwrap();
        let r = records[0].r();
        assert!((r[0] - 5.0).abs() < 1e-12);
        assert!((r[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn grid_record_keeps_row_major_shape() {
        let path = NodePath::parse("/dev2006/demods/0/sample.r").unwrap();
        let values = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let body = encode_records(&[(
            path.clone(),
            Chunk::Grid(GridRecord {
                values,
                finished: true,
            }),
        )]);
        let result = parse_records(&body).unwrap();
        let records = result.grid_records(&path).unwrap();
        assert_eq!(records[0].values.dim(), (2, 3));
        assert_eq!(records[0].values[[1, 2]], 6.0);
        assert!(records[0].finished);
    }

    #[test]
    fn merge_preserves_arrival_order() {
        let path = NodePath::parse("/dev2006/demods/0/sample").unwrap();
        let mut first = PollResult::default();
        first.insert(
            path.clone(),
            Chunk::Demod(DemodBurst {
                samples: vec![sample(1, 0.0, 0.0)],
                data_loss: false,
            }),
        );
        let mut second = PollResult::default();
        second.insert(
            path.clone(),
            Chunk::Demod(DemodBurst {
                samples: vec![sample(2, 0.0, 0.0)],
                data_loss: false,
            }),
        );
        first.merge(second);
        let flat = first.demod_samples(&path).unwrap();
        assert_eq!(flat.samples.len(), 2);
        assert_eq!(flat.samples[0].timestamp, 1);
    }
}
