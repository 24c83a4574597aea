//! Effective configuration, built once at startup from [`Settings`].

mod stream;

pub use stream::{Container, DEFAULT_SOCKET_TIMEOUT_US, RtspTransport, StreamConfig, TrackMode};

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::capture::{RetryPolicy, SegmentLayout};
use crate::cli::Settings;
use crate::retention::{RetentionPolicy, SpacePolicy};
use crate::schedule::Schedule;
use crate::{Error, Result};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Retention settings, usable without a source URL (`sweep`).
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub policy: RetentionPolicy,
    pub space: SpacePolicy,
    pub interval: Duration,
}

impl RetentionConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.sweep_interval_secs == 0 {
            return Err(Error::config("SWEEP_INTERVAL_SECS must be positive"));
        }
        if !(0.0..=100.0).contains(&settings.min_free_percent) {
            return Err(Error::config("MIN_FREE_PERCENT must be between 0 and 100"));
        }
        if !settings.min_free_gb.is_finite() || settings.min_free_gb < 0.0 {
            return Err(Error::config("MIN_FREE_GB must be a non-negative number"));
        }

        Ok(Self {
            policy: RetentionPolicy::new(&settings.out_root, settings.retention_days),
            space: SpacePolicy {
                min_free_percent: settings.min_free_percent,
                min_free_bytes: (settings.min_free_gb * BYTES_PER_GIB) as u64,
                max_delete: settings.max_delete,
                ..SpacePolicy::default()
            },
            interval: Duration::from_secs(settings.sweep_interval_secs),
        })
    }
}

/// Everything the supervisor and the retention task need.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub layout: SegmentLayout,
    pub schedule: Schedule,
    pub retry: RetryPolicy,
    pub retention: RetentionConfig,
    pub ffmpeg_bin: String,
    pub segment_gap: Duration,
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let url = settings
            .rtsp_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::config("RTSP_URL is required"))?;

        let stream = StreamConfig::new(url)
            .map_err(|e| Error::config(e.to_string()))?
            .with_socket_timeout_us(settings.sock_timeout_us)
            .with_audio_mode(settings.audio_mode)
            .with_video_mode(settings.video_mode)
            .with_container(settings.container)
            .with_transport(settings.rtsp_transport);
        stream.validate()?;

        if settings.segment_secs == 0 {
            return Err(Error::config("SEGMENT_SECS must be positive"));
        }
        if settings.camera_name.trim().is_empty() {
            return Err(Error::config("CAMERA_NAME must not be empty"));
        }
        if settings.ffmpeg_bin.trim().is_empty() {
            return Err(Error::config("FFMPEG_BIN must not be empty"));
        }

        Ok(Self {
            layout: SegmentLayout::new(&settings.out_root, &settings.camera_name, stream.container),
            stream,
            schedule: Schedule::new(Duration::from_secs(settings.segment_secs)),
            retry: RetryPolicy::new(settings.max_retries, Duration::from_secs(settings.retry_sleep)),
            retention: RetentionConfig::from_settings(settings)?,
            ffmpeg_bin: settings.ffmpeg_bin.trim().to_string(),
            segment_gap: Duration::from_secs(settings.segment_gap_secs),
            log_dir: settings.log_dir.clone(),
        })
    }

    /// Serializable view with the URL password masked.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            rtsp_url: self.stream.redacted_url(),
            out_root: self.layout.root().display().to_string(),
            camera_name: self.layout.camera().to_string(),
            log_dir: self.log_dir.display().to_string(),
            container: self.stream.container,
            audio_mode: self.stream.audio_mode,
            video_mode: self.stream.video_mode,
            rtsp_transport: self.stream.transport,
            sock_timeout_us: self.stream.socket_timeout_us,
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            max_retries: self.retry.max_retries,
            retry_sleep_secs: self.retry.delay.as_secs(),
            segment_secs: self.schedule.interval().as_secs(),
            segment_gap_secs: self.segment_gap.as_secs(),
            retention_days: self.retention.policy.max_age_days,
            sweep_interval_secs: self.retention.interval.as_secs(),
            min_free_percent: self.retention.space.min_free_percent,
            min_free_bytes: self.retention.space.min_free_bytes,
            max_delete: self.retention.space.max_delete,
        }
    }
}

/// Flat, printable form of [`AppConfig`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub rtsp_url: String,
    pub out_root: String,
    pub camera_name: String,
    pub log_dir: String,
    pub container: Container,
    pub audio_mode: TrackMode,
    pub video_mode: TrackMode,
    pub rtsp_transport: RtspTransport,
    pub sock_timeout_us: u64,
    pub ffmpeg_bin: String,
    pub max_retries: u32,
    pub retry_sleep_secs: u64,
    pub segment_secs: u64,
    pub segment_gap_secs: u64,
    pub retention_days: u32,
    pub sweep_interval_secs: u64,
    pub min_free_percent: f64,
    pub min_free_bytes: u64,
    pub max_delete: usize,
}
