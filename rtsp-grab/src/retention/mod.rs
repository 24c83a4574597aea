//! Deleting old recordings.
//!
//! [`RetentionSweeper`] removes files past a maximum age, [`SpaceGuard`]
//! removes the oldest recordings while the disk is short on free space, and
//! [`RetentionService`] runs both on a fixed cadence.

mod service;
mod space;
mod sweeper;

pub use service::{RetentionPassReport, RetentionService};
pub use space::{DEFAULT_EXTENSIONS, DiskProbe, DiskUsage, SpaceGuard, SpacePolicy, SpaceReport, SysinfoProbe};
pub use sweeper::{RetentionPolicy, RetentionSweeper, SweepReport};

use std::path::PathBuf;

use thiserror::Error;

/// A per-file problem during a retention pass. Logged, never fatal.
#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("failed to list {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stat {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
