//! RTSP source and output format settings.

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use ts::TrackSelection;
use url::Url;

use crate::capture::ConnectError;
use crate::utils::url::{parse_rtsp_url, redact_credentials};

/// Default socket timeout for connect and read, in microseconds.
pub const DEFAULT_SOCKET_TIMEOUT_US: u64 = 15_000_000;

/// What to do with the elementary streams of one media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    /// Keep the track as-is (stream copy).
    #[default]
    Copy,
    /// Discard the track.
    #[value(alias = "none")]
    Drop,
}

impl TrackMode {
    pub fn is_copy(&self) -> bool {
        matches!(self, Self::Copy)
    }
}

impl fmt::Display for TrackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// Segment container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mkv,
    Mp4,
    Ts,
}

impl Container {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
            Self::Ts => "ts",
        }
    }

    /// Muxer name understood by ffmpeg's `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mkv => "matroska",
            Self::Mp4 => "mp4",
            Self::Ts => "mpegts",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// RTSP lower transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    #[default]
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for RtspTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the source and how to record it.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    url: Url,
    pub socket_timeout_us: u64,
    pub audio_mode: TrackMode,
    pub video_mode: TrackMode,
    pub container: Container,
    pub transport: RtspTransport,
}

impl StreamConfig {
    /// Create a config for `url` with default settings.
    pub fn new(url: &str) -> Result<Self, ConnectError> {
        Ok(Self {
            url: parse_rtsp_url(url)?,
            socket_timeout_us: DEFAULT_SOCKET_TIMEOUT_US,
            audio_mode: TrackMode::Copy,
            video_mode: TrackMode::Copy,
            container: Container::Mkv,
            transport: RtspTransport::Tcp,
        })
    }

    pub fn with_socket_timeout_us(mut self, micros: u64) -> Self {
        self.socket_timeout_us = micros;
        self
    }

    pub fn with_audio_mode(mut self, mode: TrackMode) -> Self {
        self.audio_mode = mode;
        self
    }

    pub fn with_video_mode(mut self, mode: TrackMode) -> Self {
        self.video_mode = mode;
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn with_transport(mut self, transport: RtspTransport) -> Self {
        self.transport = transport;
        self
    }

    /// The full source URL, credentials included. Never log this.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// The source URL with its password masked.
    pub fn redacted_url(&self) -> String {
        redact_credentials(self.url.as_str())
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_micros(self.socket_timeout_us)
    }

    pub fn track_selection(&self) -> TrackSelection {
        TrackSelection {
            video: self.video_mode.is_copy(),
            audio: self.audio_mode.is_copy(),
        }
    }

    /// Check the invariants that builder calls cannot enforce on their own.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.audio_mode.is_copy() && !self.video_mode.is_copy() {
            return Err(crate::Error::config(
                "AUDIO_MODE and VIDEO_MODE cannot both be drop",
            ));
        }
        if self.socket_timeout_us == 0 {
            return Err(crate::Error::config("SOCK_TIMEOUT_US must be positive"));
        }
        Ok(())
    }
}
