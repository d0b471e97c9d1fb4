//! Platform write sink (§6): where BINARY-section bytes ultimately land.
//! The core only calls this in arrival order and never retries a call
//! that returned an error — the controller treats any sink failure as
//! terminal for the current attempt.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("sink rejected write: invalid state")]
    InvalidState,
    #[error("sink write failed")]
    Error,
}

pub trait WriteSink: Send + Sync {
    fn write_package_data(&mut self, buf: &[u8]) -> Result<(), SinkError>;
}

/// Builds the right sink for a resumed attempt, given how many BINARY
/// bytes were already placed in a prior run.
pub trait WriteSinkFactory: Send + Sync {
    fn open(&self, already_written: u64) -> Result<Box<dyn WriteSink>, SinkError>;
}

/// Stages package bytes in a plain file, truncated to the resume point so
/// a restarted daemon picks up writing exactly where the last attempt
/// left off rather than duplicating or skipping bytes.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn open(path: &Path, already_written: u64) -> Result<Self, SinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| SinkError::Error)?;
        file.set_len(already_written).map_err(|_| SinkError::Error)?;
        file.seek(SeekFrom::Start(already_written)).map_err(|_| SinkError::Error)?;
        Ok(Self { file })
    }
}

impl WriteSink for FileSink {
    fn write_package_data(&mut self, buf: &[u8]) -> Result<(), SinkError> {
        self.file.write_all(buf).map_err(|_| SinkError::Error)
    }
}

/// Opens a [`FileSink`] at a fixed path, used as the daemon's default
/// platform hook until a real flash-placement integration exists.
pub struct FileSinkFactory {
    pub path: std::path::PathBuf,
}

impl WriteSinkFactory for FileSinkFactory {
    fn open(&self, already_written: u64) -> Result<Box<dyn WriteSink>, SinkError> {
        Ok(Box::new(FileSink::open(&self.path, already_written)?))
    }
}

/// An in-memory sink, useful for tests and for hosts that stage the
/// package in RAM before a separate flash-placement step.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
}

impl WriteSink for MemorySink {
    fn write_package_data(&mut self, buf: &[u8]) -> Result<(), SinkError> {
        self.bytes.extend_from_slice(buf);
        Ok(())
    }
}
