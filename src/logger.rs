use serde::{de::DeserializeOwned, Serialize};
use std::{io::Write, path::PathBuf};

use crate::error::ZiError;

/// Buffered measurement logger writing JSON Lines.
///
/// Demos use this to persist polled demod samples or sweep points without
/// touching disk on every record. Intermediate flushes always append
/// JSONL; when `final_format_json` is set, the final flush rewrites the
/// file as one JSON array.
#[derive(Debug)]
pub struct Logger<T>
where
    T: Serialize + Clone + DeserializeOwned,
{
    buffer: Vec<T>,
    buffer_size: usize,
    file_path: PathBuf,
    final_format_json: bool,
    flush_failures: usize,
    max_flush_failures: usize,
}

impl<T> Logger<T>
where
    T: Serialize + Clone + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(file_path: P, buffer_size: usize, final_format_json: bool) -> Self {
        let mut path = file_path.into();
        let wanted = if final_format_json { "json" } else { "jsonl" };
        if path.extension().and_then(|e| e.to_str()) != Some(wanted) {
            path.set_extension(wanted);
        }

        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            file_path: path,
            final_format_json,
            flush_failures: 0,
            max_flush_failures: 10,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.file_path
    }

    pub fn add(&mut self, record: T) -> Result<(), ZiError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ZiError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let file = match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            Ok(f) => f,
            Err(e) => {
                self.flush_failures += 1;
                log::error!(
                    "Flush failure {}/{}: cannot open {}: {}",
                    self.flush_failures,
                    self.max_flush_failures,
                    self.file_path.display(),
                    e
                );
                if self.flush_failures >= self.max_flush_failures {
                    return Err(ZiError::Io {
                        source: e,
                        context: format!("opening log file {}", self.file_path.display()),
                    });
                }
                return Ok(());
            }
        };

        let mut writer = std::io::BufWriter::new(file);
        for record in &self.buffer {
            let line = serde_json::to_string(record)
                .map_err(|e| ZiError::Type(format!("serializing log record: {e}")))?;
            writeln!(writer, "{line}").map_err(|e| ZiError::Io {
                source: e,
                context: format!("writing log file {}", self.file_path.display()),
            })?;
        }
        writer.flush().map_err(|e| ZiError::Io {
            source: e,
            context: format!("flushing log file {}", self.file_path.display()),
        })?;

        self.flush_failures = 0;
        self.buffer.clear();
        Ok(())
    }

    /// Flush remaining records and, if configured, rewrite the JSONL file
    /// as a single JSON array.
    pub fn finalize(&mut self) -> Result<(), ZiError> {
        self.flush()?;
        if !self.final_format_json {
            return Ok(());
        }

        let contents =
            std::fs::read_to_string(&self.file_path).map_err(|e| ZiError::Io {
                source: e,
                context: format!("reading log file {}", self.file_path.display()),
            })?;
        let records: Vec<T> = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()
            .map_err(|e| ZiError::Type(format!("re-reading log records: {e}")))?;
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| ZiError::Type(format!("serializing log records: {e}")))?;
        std::fs::write(&self.file_path, json).map_err(|e| ZiError::Io {
            source: e,
            context: format!("rewriting log file {}", self.file_path.display()),
        })
    }
}

impl<T> Drop for Logger<T>
where
    T: Serialize + Clone + DeserializeOwned,
{
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Failed to flush logger on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SweepSample;

    #[test]
    fn records_flush_as_jsonl() {
        let dir = std::env::temp_dir().join(format!("zidaq-logger-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sweep");
        let mut logger: Logger<SweepSample> = Logger::new(&path, 2, false);
        for i in 0..3 {
            logger
                .add(SweepSample {
                    grid: f64::from(i),
                    x: 0.0,
                    y: 0.0,
                    bandwidth: 10.0,
                    count: 1,
                })
                .unwrap();
        }
        logger.flush().unwrap();
        let contents = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(contents.lines().count(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }
}
