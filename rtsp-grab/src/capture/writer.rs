//! Recording one segment from a packet stream.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ts::{TrackFilter, TrackSelection};

use crate::capture::sink::open_sink;
use crate::capture::{PacketStream, StreamError};
use crate::config::Container;
use crate::schedule::{Clock, SystemClock};

/// Why a segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The scheduling boundary was reached.
    ScheduledRollover,
    /// The source closed the stream.
    StreamEnded,
    /// A read or write failed, or the stream stalled.
    StreamError,
    /// Shutdown was requested.
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduledRollover => "scheduled_rollover",
            Self::StreamEnded => "stream_ended",
            Self::StreamError => "stream_error",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one recorded segment.
#[derive(Debug)]
pub struct SegmentResult {
    pub path: PathBuf,
    /// Size of the finished file.
    pub bytes_written: u64,
    pub packets_written: u64,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub end_reason: EndReason,
    /// Set when `end_reason` is [`EndReason::StreamError`].
    pub error: Option<StreamError>,
}

impl SegmentResult {
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Copies packets into a segment file until rollover, end of stream, error
/// or shutdown.
#[derive(Debug, Clone)]
pub struct SegmentWriter {
    container: Container,
    selection: TrackSelection,
    read_timeout: Duration,
    ffmpeg_bin: String,
    clock: Arc<dyn Clock>,
}

impl SegmentWriter {
    pub fn new(container: Container, selection: TrackSelection, read_timeout: Duration) -> Self {
        Self {
            container,
            selection,
            read_timeout,
            ffmpeg_bin: "ffmpeg".to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for the segment timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Media tool used to mux mkv and mp4 segments.
    pub fn with_ffmpeg_bin(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg_bin = program.into();
        self
    }

    pub fn container(&self) -> Container {
        self.container
    }

    /// Record `stream` into `output_path` until `rollover_at`.
    ///
    /// The stream is closed and the sink finished on every path. An error is
    /// returned only when the segment could not be opened; failures after
    /// that are reported through [`SegmentResult::error`].
    pub async fn write(
        &self,
        mut stream: PacketStream,
        output_path: &Path,
        rollover_at: Instant,
        cancel: &CancellationToken,
    ) -> Result<SegmentResult, StreamError> {
        let started_at = self.clock.now();
        let mut sink = match open_sink(&self.ffmpeg_bin, self.container, self.selection, output_path).await {
            Ok(sink) => sink,
            Err(e) => {
                stream.close().await;
                return Err(e);
            }
        };

        let mut filter = TrackFilter::new(self.selection);
        let mut packets_written = 0u64;
        let deadline = tokio::time::sleep_until(rollover_at);
        tokio::pin!(deadline);

        let (mut end_reason, mut error) = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break (EndReason::Shutdown, None),
                _ = &mut deadline => break (EndReason::ScheduledRollover, None),
                next = tokio::time::timeout(self.read_timeout, stream.next()) => match next {
                    Err(_) => {
                        let stalled = StreamError::Stalled { timeout: self.read_timeout };
                        break (EndReason::StreamError, Some(stalled));
                    }
                    Ok(None) => break (EndReason::StreamEnded, None),
                    Ok(Some(Err(e))) => break (EndReason::StreamError, Some(e)),
                    Ok(Some(Ok(packet))) => {
                        let Some(packet) = filter.filter(packet) else {
                            continue;
                        };
                        if let Err(e) = sink.write_packet(&packet).await {
                            break (EndReason::StreamError, Some(e));
                        }
                        packets_written += 1;
                    }
                },
            }
        };

        stream.close().await;

        let bytes_written = match sink.finish().await {
            Ok(size) => size,
            Err(e) => {
                warn!(path = %output_path.display(), error = %e, "Failed to finalize segment");
                if error.is_none() {
                    end_reason = EndReason::StreamError;
                    error = Some(e);
                }
                file_size(output_path).await
            }
        };

        if packets_written == 0 && bytes_written == 0 {
            debug!(path = %output_path.display(), "Removing empty segment");
            let _ = tokio::fs::remove_file(output_path).await;
        }

        if filter.dropped_packets() > 0 {
            debug!(dropped = filter.dropped_packets(), "Packets of dropped tracks discarded");
        }

        Ok(SegmentResult {
            path: output_path.to_path_buf(),
            bytes_written,
            packets_written,
            started_at,
            ended_at: self.clock.now(),
            end_reason,
            error,
        })
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}
