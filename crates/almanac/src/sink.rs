use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::types::{FetchUnit, Record};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write records: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives each unit's records once the unit has been fully extracted.
pub trait RecordSink {
    fn accept(&self, unit: &FetchUnit, records: &[Record]) -> Result<(), SinkError>;
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .inspect_err(|e| log::error!("Failed to open {}: {}", path.display(), e))?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesSink {
    fn accept(&self, unit: &FetchUnit, records: &[Record]) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        log::debug!("Wrote {} records for {}", records.len(), unit);
        Ok(())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordSink for MemorySink {
    fn accept(&self, _unit: &FetchUnit, records: &[Record]) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(records);
        Ok(())
    }
}
