//! The capture loop.
//!
//! The supervisor connects, records one segment per scheduling interval,
//! reconnects at every boundary and after stream failures, and gives up with
//! a [`FatalCaptureError`] once the retry budget is spent.

mod active;
mod state;

pub use active::ActiveSegment;
pub use state::{CaptureSession, SessionState, SupervisorState};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::capture::{
    Connector, EndReason, FatalCaptureError, RetryDecision, RetryPolicy, RetryState, SegmentLayout,
    SegmentResult, SegmentWriter,
};
use crate::config::AppConfig;
use crate::schedule::{Clock, Schedule, SystemClock};

/// Default pause after a stream ended on its own.
pub const DEFAULT_SEGMENT_GAP: Duration = Duration::from_secs(2);

/// Counters reported when the supervisor stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub segments: u64,
    pub bytes_written: u64,
    pub connect_failures: u64,
    pub stream_failures: u64,
}

/// Drives connector and writer through the capture state machine.
pub struct Supervisor<C> {
    connector: C,
    writer: SegmentWriter,
    layout: SegmentLayout,
    schedule: Schedule,
    retry_policy: RetryPolicy,
    retry: RetryState,
    clock: Arc<dyn Clock>,
    segment_gap: Duration,
    active: ActiveSegment,
    state_tx: watch::Sender<SupervisorState>,
    session: Option<CaptureSession>,
    stats: SupervisorStats,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, writer: SegmentWriter, layout: SegmentLayout) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            connector,
            writer: writer.with_clock(clock.clone()),
            layout,
            schedule: Schedule::default(),
            retry_policy: RetryPolicy::default(),
            retry: RetryState::new(),
            clock,
            segment_gap: DEFAULT_SEGMENT_GAP,
            active: ActiveSegment::new(),
            state_tx,
            session: None,
            stats: SupervisorStats::default(),
        }
    }

    /// Build a supervisor from the effective configuration.
    pub fn from_config(connector: C, config: &AppConfig) -> Self {
        let writer = SegmentWriter::new(
            config.stream.container,
            config.stream.track_selection(),
            config.stream.socket_timeout(),
        )
        .with_ffmpeg_bin(config.ffmpeg_bin.clone());

        Self::new(connector, writer, config.layout.clone())
            .with_schedule(config.schedule)
            .with_retry_policy(config.retry)
            .with_segment_gap(config.segment_gap)
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.writer = self.writer.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_segment_gap(mut self, gap: Duration) -> Self {
        self.segment_gap = gap;
        self
    }

    /// Publish the active segment on an existing channel.
    pub fn with_active_segment(mut self, active: ActiveSegment) -> Self {
        self.active = active;
        self
    }

    pub fn active_segment(&self) -> ActiveSegment {
        self.active.clone()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    fn set_state(&mut self, target: SupervisorState) -> Result<()> {
        let current = self.state();
        let next = current.transition_to(target)?;
        if current != next {
            debug!(from = %current, to = %next, "Supervisor state changed");
        }
        self.state_tx.send_replace(next);
        Ok(())
    }

    /// Record until `cancel` fires or retries are exhausted.
    ///
    /// Returns the counters on graceful shutdown and
    /// [`crate::Error::FatalCapture`] when the retry budget is spent.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SupervisorStats> {
        let source = self.connector.source();
        info!(
            source = %source,
            root = %self.layout.root().display(),
            container = %self.layout.container(),
            interval_secs = self.schedule.interval().as_secs(),
            max_retries = self.retry_policy.max_retries,
            "Supervisor starting"
        );
        self.set_state(SupervisorState::Connecting)?;

        loop {
            let planned_at = self.clock.now();
            self.session = Some(CaptureSession::connecting(
                planned_at,
                self.layout.segment_path(planned_at),
            ));

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    self.stats.connect_failures += 1;
                    warn!(
                        kind = e.kind(),
                        url = %source,
                        attempt = self.retry.attempt() + 1,
                        error = %e,
                        "Connection failed"
                    );
                    if !self.retry_after_failure(e.to_string(), &cancel).await? {
                        break;
                    }
                    continue;
                }
            };

            let start = self.clock.now();
            let path = match self.layout.prepare(start).await {
                Ok(path) => path,
                Err(e) => {
                    stream.close().await;
                    self.stats.stream_failures += 1;
                    warn!(kind = "StreamError", error = %e, "Could not prepare segment");
                    if !self.retry_after_failure(e.to_string(), &cancel).await? {
                        break;
                    }
                    continue;
                }
            };

            let boundary = self.schedule.next_boundary(start);
            let rollover_at = Instant::now() + self.schedule.until_next_boundary(start);
            self.active.set(&path);
            if let Some(session) = self.session.as_mut() {
                session.begin_recording(start, path.clone());
            }
            self.set_state(SupervisorState::Recording)?;
            info!(
                path = %path.display(),
                until = %boundary.format("%Y-%m-%d %H:%M:%S"),
                "Recording segment"
            );

            let outcome = self.writer.write(stream, &path, rollover_at, &cancel).await;
            if let Some(session) = self.session.as_mut() {
                session.state = SessionState::Closing;
            }
            self.active.clear();

            let segment = match outcome {
                Ok(segment) => segment,
                Err(e) => {
                    self.stats.stream_failures += 1;
                    warn!(kind = "StreamError", path = %path.display(), error = %e, "Could not open segment");
                    self.set_state(SupervisorState::Connecting)?;
                    if !self.retry_after_failure(e.to_string(), &cancel).await? {
                        break;
                    }
                    continue;
                }
            };
            self.log_segment(&segment);

            match segment.end_reason {
                EndReason::Shutdown => break,
                EndReason::ScheduledRollover => {
                    self.retry.reset();
                    self.set_state(SupervisorState::RollingOver)?;
                    self.set_state(SupervisorState::Connecting)?;
                }
                EndReason::StreamEnded => {
                    self.retry.reset();
                    self.set_state(SupervisorState::Connecting)?;
                    info!(
                        gap_secs = self.segment_gap.as_secs(),
                        "Stream ended before the boundary, reconnecting"
                    );
                    if !sleep_or_cancel(self.segment_gap, &cancel).await {
                        break;
                    }
                }
                EndReason::StreamError => {
                    self.stats.stream_failures += 1;
                    self.set_state(SupervisorState::Connecting)?;
                    let detail = segment
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "stream error".to_string());
                    if !self.retry_after_failure(detail, &cancel).await? {
                        break;
                    }
                }
            }
        }

        self.session = None;
        self.set_state(SupervisorState::Idle)?;
        info!(
            segments = self.stats.segments,
            bytes_written = self.stats.bytes_written,
            connect_failures = self.stats.connect_failures,
            stream_failures = self.stats.stream_failures,
            "Supervisor stopped"
        );
        Ok(self.stats)
    }

    /// Apply the retry policy. `Ok(false)` means shutdown was requested
    /// while waiting.
    async fn retry_after_failure(
        &mut self,
        last_error: String,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        match self.retry.record_failure(&self.retry_policy) {
            RetryDecision::Retry { attempt, delay } => {
                self.set_state(SupervisorState::Connecting)?;
                warn!(
                    attempt,
                    max_retries = self.retry_policy.max_retries,
                    delay_secs = delay.as_secs_f64(),
                    "Retrying"
                );
                Ok(sleep_or_cancel(delay, cancel).await)
            }
            RetryDecision::Exhausted { attempts } => {
                self.set_state(SupervisorState::Failed)?;
                if let Some(session) = self.session.as_mut() {
                    session.state = SessionState::Failed;
                }
                let fatal = FatalCaptureError {
                    attempts,
                    retries: self.retry_policy.max_retries,
                    last_error,
                };
                error!(
                    kind = "FatalCaptureError",
                    url = %self.connector.source(),
                    attempts,
                    error = %fatal,
                    "Retries exhausted"
                );
                Err(fatal.into())
            }
        }
    }

    fn log_segment(&mut self, segment: &SegmentResult) {
        if segment.packets_written > 0 {
            self.stats.segments += 1;
            self.stats.bytes_written += segment.bytes_written;
        }
        match &segment.error {
            Some(e) => warn!(
                kind = "StreamError",
                path = %segment.path.display(),
                reason = %segment.end_reason,
                bytes = segment.bytes_written,
                packets = segment.packets_written,
                duration_secs = segment.duration().as_secs(),
                error = %e,
                "Segment closed after stream error"
            ),
            None => info!(
                path = %segment.path.display(),
                reason = %segment.end_reason,
                bytes = segment.bytes_written,
                packets = segment.packets_written,
                duration_secs = segment.duration().as_secs(),
                "Segment closed"
            ),
        }
    }
}

/// Sleep for `duration`; `false` if cancelled first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::capture::StreamError;
    use crate::config::Container;
    use crate::capture::PacketStream;
    use crate::schedule::AnchoredClock;
    use crate::test_utils::{FnConnector, finite_stream, live_stream, unreachable_source};
    use chrono::{Local, TimeZone};
    use futures::{StreamExt, stream};
    use ts::TrackSelection;

    /// Mid-hour, so no test crosses a boundary.
    fn clock() -> AnchoredClock {
        AnchoredClock::new(Local.with_ymd_and_hms(2024, 6, 1, 10, 20, 0).single().unwrap())
    }

    fn writer() -> SegmentWriter {
        SegmentWriter::new(Container::Ts, TrackSelection::ALL, Duration::from_secs(15))
    }

    fn layout(dir: &tempfile::TempDir) -> SegmentLayout {
        SegmentLayout::new(dir.path(), "cam1", Container::Ts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_source_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(FnConnector::new(|_| Err(unreachable_source())));
        let supervisor = Supervisor::new(connector.clone(), writer(), layout(&dir))
            .with_clock(clock())
            .with_retry_policy(RetryPolicy::new(5, Duration::from_secs(5)));
        let state = supervisor.subscribe_state();

        let started = Instant::now();
        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();

        match err {
            Error::FatalCapture(fatal) => {
                assert_eq!(fatal.attempts, 6);
                assert_eq!(fatal.retries, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(connector.attempts(), 6);
        assert_eq!(started.elapsed(), Duration::from_secs(25));
        let times = connector.connect_times();
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
        }
        assert_eq!(*state.borrow(), SupervisorState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_success_reaches_recording() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FnConnector::new(|_| Ok(live_stream(Duration::from_millis(50))));
        let supervisor = Supervisor::new(connector, writer(), layout(&dir)).with_clock(clock());
        let mut state = supervisor.subscribe_state();
        let active = supervisor.active_segment();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervisor.run(cancel.clone()));

        tokio::time::timeout(
            Duration::from_secs(15),
            state.wait_for(|s| *s == SupervisorState::Recording),
        )
        .await
        .unwrap()
        .unwrap();
        let recording = active.current().unwrap();
        assert!(recording.starts_with(dir.path()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.segments, 1);
        assert_eq!(stats.connect_failures, 0);
        assert!(active.current().is_none());
        assert_eq!(*state.borrow(), SupervisorState::Idle);
        assert!(recording.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_segment_resets_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        // fail, fail, short clean segment, fail, fail, live.
        let connector = FnConnector::new(|attempt| match attempt {
            3 => Ok(finite_stream(5, Duration::from_millis(10))),
            6.. => Ok(live_stream(Duration::from_millis(100))),
            _ => Err(unreachable_source()),
        });
        let supervisor = Supervisor::new(connector, writer(), layout(&dir))
            .with_clock(clock())
            .with_retry_policy(RetryPolicy::new(2, Duration::from_secs(1)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let stats = supervisor.run(cancel).await.unwrap();
        assert_eq!(stats.connect_failures, 4);
        assert_eq!(stats.segments, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_errors_count_against_budget() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FnConnector::new(|_| {
            let packets = finite_stream(3, Duration::from_millis(10)).chain(stream::once(async {
                Err(StreamError::Stalled {
                    timeout: Duration::from_secs(15),
                })
            }));
            Ok(PacketStream::new(packets))
        });
        let supervisor = Supervisor::new(connector, writer(), layout(&dir))
            .with_clock(clock())
            .with_retry_policy(RetryPolicy::new(2, Duration::from_secs(1)));

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        match err {
            Error::FatalCapture(fatal) => {
                assert_eq!(fatal.attempts, 3);
                assert!(fatal.last_error.contains("no packet received"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_retry_wait_is_graceful() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FnConnector::new(|_| Err(unreachable_source()));
        let supervisor = Supervisor::new(connector, writer(), layout(&dir))
            .with_clock(clock())
            .with_retry_policy(RetryPolicy::new(100, Duration::from_secs(5)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let stats = supervisor.run(cancel).await.unwrap();
        assert_eq!(stats.connect_failures, 3);
        assert_eq!(stats.segments, 0);
    }
}
