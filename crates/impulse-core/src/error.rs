//! Error and status types for the offline task pipeline
//!
//! Background tasks fail with a [`TaskError`]. The real-time side never sees
//! the error value itself, only its [`LoadStatus`] code, which is stored in an
//! atomic and read once per audio block.

use std::path::PathBuf;
use thiserror::Error;

/// Status code surfaced on a file's status port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LoadStatus {
    /// Task finished successfully
    Ok = 0,
    /// No file specified (not an error, just nothing loaded)
    #[default]
    Unspecified = 1,
    /// A load is in progress
    Loading = 2,
    /// Allocation or kernel build failure
    NoMemory = 3,
    /// File does not exist or could not be opened
    NotFound = 4,
    /// File could not be decoded
    DecodeFailed = 5,
    /// File could not be resampled to the processing rate
    ResampleFailed = 6,
    /// Unrecognised status code
    Unknown = 255,
}

impl LoadStatus {
    /// Raw status code as stored in atomics
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Convert a raw status code back into a status
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => LoadStatus::Ok,
            1 => LoadStatus::Unspecified,
            2 => LoadStatus::Loading,
            3 => LoadStatus::NoMemory,
            4 => LoadStatus::NotFound,
            5 => LoadStatus::DecodeFailed,
            6 => LoadStatus::ResampleFailed,
            _ => LoadStatus::Unknown,
        }
    }

    /// Whether the status represents a successful operation
    #[inline]
    pub fn is_ok(self) -> bool {
        self == LoadStatus::Ok
    }

    /// Human-readable name for status displays
    pub fn name(self) -> &'static str {
        match self {
            LoadStatus::Ok => "OK",
            LoadStatus::Unspecified => "Unspecified",
            LoadStatus::Loading => "Loading",
            LoadStatus::NoMemory => "Out of memory",
            LoadStatus::NotFound => "Not found",
            LoadStatus::DecodeFailed => "Decode failed",
            LoadStatus::ResampleFailed => "Resample failed",
            LoadStatus::Unknown => "Unknown",
        }
    }
}

/// Errors produced by background tasks
#[derive(Error, Debug)]
pub enum TaskError {
    /// Empty or absent file path
    #[error("No impulse file specified")]
    Unspecified,

    /// Allocation or kernel construction failed
    #[error("Out of memory while building {0}")]
    NoMemory(&'static str),

    /// File could not be opened
    #[error("Impulse file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Container or codec failure
    #[error("Failed to decode impulse file: {0}")]
    Decode(String),

    /// Sample rate conversion failure
    #[error("Failed to resample impulse file: {0}")]
    Resample(String),
}

impl TaskError {
    /// Status code reported to the real-time side for this error
    pub fn status(&self) -> LoadStatus {
        match self {
            TaskError::Unspecified => LoadStatus::Unspecified,
            TaskError::NoMemory(_) => LoadStatus::NoMemory,
            TaskError::NotFound(_) => LoadStatus::NotFound,
            TaskError::Decode(_) => LoadStatus::DecodeFailed,
            TaskError::Resample(_) => LoadStatus::ResampleFailed,
        }
    }
}

/// Result type for background task bodies
pub type TaskResult = Result<(), TaskError>;
