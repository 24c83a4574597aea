//! Command-line interface.
//!
//! Every setting can be given as a flag or through the environment variable
//! named in its `env` attribute; a `.env` file is loaded before parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Container, RtspTransport, TrackMode};
use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "rtsp-grab", version, about = "Record an RTSP camera into clock-aligned segments")]
pub struct Args {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Record until stopped (default)
    Run,
    /// Run one retention and free-space pass, then exit
    Sweep {
        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration, check the media tool and print the effective settings
    Check,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// RTSP source URI
    #[arg(long, env = "RTSP_URL", hide_env_values = true, global = true)]
    pub rtsp_url: Option<String>,

    /// Root directory for recordings
    #[arg(long, env = "OUT_ROOT", default_value = "/var/videos/camara1", global = true)]
    pub out_root: PathBuf,

    /// Segment filename prefix
    #[arg(long, env = "CAMERA_NAME", default_value = "cam1", global = true)]
    pub camera_name: String,

    /// Log directory kept for installer compatibility; logs go to stdout
    #[arg(long, env = "LOG_DIR", default_value = "/var/log/rtsp_grab", global = true)]
    pub log_dir: PathBuf,

    #[arg(long, env = "CONTAINER", value_enum, ignore_case = true, default_value_t = Container::Mkv, global = true)]
    pub container: Container,

    #[arg(long, env = "AUDIO_MODE", value_enum, ignore_case = true, default_value_t = TrackMode::Copy, global = true)]
    pub audio_mode: TrackMode,

    #[arg(long, env = "VIDEO_MODE", value_enum, ignore_case = true, default_value_t = TrackMode::Copy, global = true)]
    pub video_mode: TrackMode,

    /// Delete recordings older than this many days (0 disables)
    #[arg(long, env = "RETENTION_DAYS", default_value_t = 7, global = true)]
    pub retention_days: u32,

    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg", global = true)]
    pub ffmpeg_bin: String,

    /// Connect and read timeout in microseconds
    #[arg(long, env = "SOCK_TIMEOUT_US", default_value_t = 15_000_000, global = true)]
    pub sock_timeout_us: u64,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 5, global = true)]
    pub max_retries: u32,

    /// Seconds between retries
    #[arg(long, env = "RETRY_SLEEP", default_value_t = 5, global = true)]
    pub retry_sleep: u64,

    #[arg(long, env = "RTSP_TRANSPORT", value_enum, ignore_case = true, default_value_t = RtspTransport::Tcp, global = true)]
    pub rtsp_transport: RtspTransport,

    /// Scheduling interval in seconds, aligned to local midnight
    #[arg(long, env = "SEGMENT_SECS", default_value_t = 3600, global = true)]
    pub segment_secs: u64,

    /// Pause in seconds after a stream ends before reconnecting
    #[arg(long, env = "SEGMENT_GAP_SECS", default_value_t = 2, global = true)]
    pub segment_gap_secs: u64,

    /// Seconds between retention passes
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 3600, global = true)]
    pub sweep_interval_secs: u64,

    /// Free space (percent of the disk) to keep available, 0 disables
    #[arg(long, env = "MIN_FREE_PERCENT", default_value_t = 0.0, global = true)]
    pub min_free_percent: f64,

    /// Free space (GiB) to keep available, 0 disables
    #[arg(long, env = "MIN_FREE_GB", default_value_t = 0.0, global = true)]
    pub min_free_gb: f64,

    /// Maximum files deleted per free-space pass
    #[arg(long, env = "MAX_DELETE", default_value_t = 500, global = true)]
    pub max_delete: usize,

    #[arg(long, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}
