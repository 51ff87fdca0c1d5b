//! Error types for the watermarking engine.
//!
//! `WatermarkError` carries the typed failure; `ErrorKind` is the compact,
//! serializable classification recorded in every failed `TaskResult`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failure, stable across the worker process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Discovery,
    ImageRead,
    ImageWrite,
    MemorySample,
    Worker,
}

impl ErrorKind {
    /// Fatal kinds abort a run before any image is scheduled.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Config | ErrorKind::Discovery)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Discovery => "discovery",
            ErrorKind::ImageRead => "image-read",
            ErrorKind::ImageWrite => "image-write",
            ErrorKind::MemorySample => "memory-sample",
            ErrorKind::Worker => "worker",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum WatermarkError {
    /// Settings failed to load or validate
    #[error("Invalid settings: {0}")]
    Config(String),

    /// Input folder missing or unreadable
    #[error("Cannot read input folder {}: {reason}", path.display())]
    Discovery { path: PathBuf, reason: String },

    /// Image could not be opened or decoded
    #[error("Failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Output could not be created or encoded
    #[error("Failed to write image {}: {reason}", path.display())]
    ImageWrite { path: PathBuf, reason: String },

    /// Resident memory query failed
    #[error("Memory sample failed: {0}")]
    MemorySample(String),

    /// Worker process spawn or protocol failure
    #[error("Worker error: {0}")]
    Worker(String),
}

impl WatermarkError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn discovery(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Discovery {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn image_write(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::ImageWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn worker<T: Into<String>>(msg: T) -> Self {
        Self::Worker(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WatermarkError::Config(_) => ErrorKind::Config,
            WatermarkError::Discovery { .. } => ErrorKind::Discovery,
            WatermarkError::ImageRead { .. } => ErrorKind::ImageRead,
            WatermarkError::ImageWrite { .. } => ErrorKind::ImageWrite,
            WatermarkError::MemorySample(_) => ErrorKind::MemorySample,
            WatermarkError::Worker(_) => ErrorKind::Worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::Config.is_fatal());
        assert!(ErrorKind::Discovery.is_fatal());
        assert!(!ErrorKind::ImageRead.is_fatal());
        assert!(!ErrorKind::ImageWrite.is_fatal());
        assert!(!ErrorKind::Worker.is_fatal());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ImageWrite).unwrap();
        assert_eq!(json, "\"image_write\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::ImageWrite);
    }

    #[test]
    fn test_error_kind_mapping() {
        let err = WatermarkError::image_write("out/a.png", "disk full");
        assert_eq!(err.kind(), ErrorKind::ImageWrite);
        assert!(err.to_string().contains("out/a.png"));
        assert!(err.to_string().contains("disk full"));
    }
}
