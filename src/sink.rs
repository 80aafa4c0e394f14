//! Callback sink receiving decoded records.
//!
//! Every successful poll hands its record to a shared [`Callback`]. Several
//! collector tasks call it during the same tick, so implementations must be
//! internally synchronized.

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::device::DeviceRecord;

/// Errors a sink can report for one record.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Writing the record failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the record failed.
    #[error("sink serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sink refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Consumer of decoded device records.
pub trait Callback: Send + Sync + 'static {
    /// Accept `record` published under `key`.
    fn call(&self, record: &DeviceRecord, key: &str) -> Result<(), CallbackError>;
}

/// One output line of [`JsonLinesSink`].
#[derive(Debug, Serialize)]
struct Line<'a> {
    ts: DateTime<Utc>,
    key: &'a str,
    #[serde(flatten)]
    record: &'a DeviceRecord,
}

/// Sink writing each record as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send + 'static> Callback for JsonLinesSink<W> {
    fn call(&self, record: &DeviceRecord, key: &str) -> Result<(), CallbackError> {
        let line = Line {
            ts: Utc::now(),
            key,
            record,
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| CallbackError::Rejected("sink writer poisoned".to_string()))?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send + 'static> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DpllFilesystemInfo, GnssNav};

    fn dpll() -> DeviceRecord {
        DeviceRecord::DpllFilesystem(DpllFilesystemInfo {
            eec_state: 3,
            pps_state: 3,
            pps_offset: 2,
        })
    }

    #[test]
    fn test_json_lines_format() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.call(&dpll(), "dpll-info-fs").unwrap();
        sink.call(
            &DeviceRecord::GnssNav(GnssNav {
                itow_ms: 1,
                fix_type: 5,
                fix_ok: true,
                ttff_ms: None,
                msss_ms: None,
            }),
            "gpsNav",
        )
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["key"], "dpll-info-fs");
        assert_eq!(lines[0]["type"], "dpll-filesystem");
        assert_eq!(lines[0]["data"]["eec_state"], 3);
        assert!(lines[0]["ts"].is_string());
        assert_eq!(lines[1]["data"]["fix_type"], 5);
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_callback_error() {
        let sink = JsonLinesSink::new(FailingWriter);
        let err = sink.call(&dpll(), "dpll-info-fs").unwrap_err();
        assert!(matches!(err, CallbackError::Io(_)));
    }

    #[test]
    fn test_concurrent_calls_do_not_interleave() {
        let sink = std::sync::Arc::new(JsonLinesSink::new(Vec::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        sink.call(&dpll(), "dpll-info-fs").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sink = std::sync::Arc::try_unwrap(sink).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 200);
        assert!(out.lines().all(|l| serde_json::from_str::<serde_json::Value>(l).is_ok()));
    }
}
