//! Logging setup.
//!
//! Events go to stdout only, either as human-readable lines or as JSON
//! objects, with timestamps in the local timezone. The filter comes from
//! `RUST_LOG` and falls back to [`DEFAULT_LOG_FILTER`].

use std::fmt;

use chrono::Local;
use clap::ValueEnum;
use tracing_subscriber::{
    EnvFilter,
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "rtsp_grab=info,process_utils=info,ts=info";

/// Output encoding of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Timer that formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn build_filter(directive: Option<&str>) -> crate::Result<EnvFilter> {
    match directive.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("Invalid RUST_LOG directive: {}", e))),
        None => Ok(EnvFilter::new(DEFAULT_LOG_FILTER)),
    }
}

/// Install the global subscriber.
pub fn init_logging(format: LogFormat) -> crate::Result<()> {
    let directive = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(directive.as_deref())?;

    let (text, json) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_ansi(true).with_timer(LocalTimer)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_timer(LocalTimer),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))
}
