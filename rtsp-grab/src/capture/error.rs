//! Capture error taxonomy.
//!
//! [`ConnectError`] and [`StreamError`] are transient and handled by the
//! retry policy. Once retries are exhausted the supervisor surfaces a
//! [`FatalCaptureError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to open the RTSP source.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// No packet arrived within the socket timeout.
    #[error("no data from {url} within {}ms", timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("ingest for {url} exited before producing data (code {code:?}): {detail}")]
    Exited {
        url: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("failed to read from ingest for {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: ts::TsError,
    },
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TimeoutError",
            _ => "ConnectError",
        }
    }
}

/// Failure while a segment is being recorded.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("no packet received for {}ms", timeout.as_millis())]
    Stalled { timeout: Duration },

    #[error("packet stream read failed: {0}")]
    Read(#[from] ts::TsError),

    #[error("failed to write segment {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("muxer for {} failed: {detail}", path.display())]
    Mux { path: PathBuf, detail: String },

    /// The ingest closed its output and exited unsuccessfully.
    #[error("ingest exited mid-stream (code {code:?}): {detail}")]
    IngestExited { code: Option<i32>, detail: String },
}

impl StreamError {
    pub(crate) fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }
}

/// Retries are exhausted; the process should exit non-zero.
#[derive(Error, Debug, Clone)]
#[error("capture failed after {attempts} attempts ({retries} retries): {last_error}")]
pub struct FatalCaptureError {
    pub attempts: u32,
    pub retries: u32,
    pub last_error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_its_own_kind() {
        let timeout = ConnectError::Timeout {
            url: "rtsp://cam/stream".into(),
            timeout: Duration::from_secs(15),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.kind(), "TimeoutError");
        assert_eq!(timeout.to_string(), "no data from rtsp://cam/stream within 15000ms");

        let exited = ConnectError::Exited {
            url: "rtsp://cam/stream".into(),
            code: Some(1),
            detail: "Connection refused".into(),
        };
        assert!(!exited.is_timeout());
        assert_eq!(exited.kind(), "ConnectError");
    }

    #[test]
    fn test_ingest_exit_message_carries_stderr() {
        let err = StreamError::IngestExited {
            code: Some(1),
            detail: "Connection reset by peer".into(),
        };
        assert_eq!(
            err.to_string(),
            "ingest exited mid-stream (code Some(1)): Connection reset by peer"
        );
    }

    #[test]
    fn test_fatal_message() {
        let fatal = FatalCaptureError {
            attempts: 6,
            retries: 5,
            last_error: "no data".into(),
        };
        assert_eq!(
            fatal.to_string(),
            "capture failed after 6 attempts (5 retries): no data"
        );
    }
}
