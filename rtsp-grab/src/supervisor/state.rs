//! Supervisor and session state machines.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

use crate::Error;

/// Supervisor operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    /// Not started, or stopped after shutdown.
    #[default]
    Idle,
    /// Opening the source, possibly after a retry delay.
    Connecting,
    /// Writing a segment.
    Recording,
    /// The scheduling boundary was reached; the next segment is being set up.
    RollingOver,
    /// Retries are exhausted. Terminal.
    Failed,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Recording => "RECORDING",
            Self::RollingOver => "ROLLING_OVER",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: SupervisorState) -> bool {
        use SupervisorState::*;

        match (self, target) {
            (Failed, _) => false,
            (Idle, Connecting) => true,
            // Retry after a connect failure.
            (Connecting, Connecting | Recording | Failed) => true,
            (Recording, RollingOver | Connecting) => true,
            (RollingOver, Connecting) => true,
            // Shutdown from any live state.
            (Connecting | Recording | RollingOver, Idle) => true,
            _ => false,
        }
    }

    pub fn transition_to(&self, target: SupervisorState) -> Result<SupervisorState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Connecting,
    Recording,
    Closing,
    Failed,
}

/// The live capture session. At most one exists at a time.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub started_at: DateTime<Local>,
    pub segment_path: PathBuf,
    pub state: SessionState,
}

impl CaptureSession {
    /// A session about to connect; `segment_path` is the planned name.
    pub fn connecting(started_at: DateTime<Local>, segment_path: PathBuf) -> Self {
        Self {
            started_at,
            segment_path,
            state: SessionState::Connecting,
        }
    }

    /// Connected: the segment starts now at its final path.
    pub fn begin_recording(&mut self, started_at: DateTime<Local>, segment_path: PathBuf) {
        self.started_at = started_at;
        self.segment_path = segment_path;
        self.state = SessionState::Recording;
    }
}
