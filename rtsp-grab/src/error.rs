//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::capture::FatalCaptureError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for a graceful shutdown.
pub const EXIT_OK: u8 = 0;

/// Exit code for fatal capture failures and other runtime errors.
pub const EXIT_RUNTIME: u8 = 1;

/// Exit code for invalid configuration.
pub const EXIT_CONFIG: u8 = 2;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    FatalCapture(#[from] FatalCaptureError),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short name used as the `kind` field of error log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigError",
            Self::FatalCapture(_) => "FatalCaptureError",
            Self::InvalidStateTransition { .. } => "InvalidStateTransition",
            Self::IoPath { .. } => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Other(_) => "Error",
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => EXIT_CONFIG,
            _ => EXIT_RUNTIME,
        }
    }
}
