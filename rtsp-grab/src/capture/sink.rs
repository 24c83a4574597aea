//! Segment file writers.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{StderrTail, media_command, spawn_stderr_forwarder, wait_with_grace};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::debug;
use ts::{TrackSelection, TsPacket};

use crate::capture::StreamError;
use crate::config::Container;

/// Write buffer size, a multiple of the packet size.
const WRITE_BUFFER: usize = ts::PACKET_SIZE * 1024;

/// How long the muxer gets to write its trailer after stdin closes.
const MUX_FINALIZE_GRACE: Duration = Duration::from_secs(15);

const STDERR_TAIL_LINES: usize = 8;

/// Destination of one segment's packets.
#[async_trait]
pub trait SegmentSink: Send {
    fn path(&self) -> &Path;

    async fn write_packet(&mut self, packet: &TsPacket) -> Result<(), StreamError>;

    /// Flush and close the segment, returning its size on disk.
    async fn finish(self: Box<Self>) -> Result<u64, StreamError>;
}

/// Writes packets unchanged into a `.ts` file.
pub struct TsFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
}

impl TsFileSink {
    /// Create `path`; fails if it already exists.
    pub async fn create(path: &Path) -> Result<Self, StreamError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| StreamError::sink(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(WRITE_BUFFER, file),
            bytes: 0,
        })
    }
}

#[async_trait]
impl SegmentSink for TsFileSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_packet(&mut self, packet: &TsPacket) -> Result<(), StreamError> {
        let data = packet.as_bytes();
        self.writer
            .write_all(data)
            .await
            .map_err(|e| StreamError::sink(&self.path, e))?;
        self.bytes += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, StreamError> {
        self.writer
            .flush()
            .await
            .map_err(|e| StreamError::sink(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .await
            .map_err(|e| StreamError::sink(&self.path, e))?;
        Ok(self.bytes)
    }
}

/// Remuxes packets into mkv or mp4 through a stream-copy ffmpeg process.
pub struct FfmpegMuxSink {
    path: PathBuf,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_task: Option<JoinHandle<()>>,
    tail: StderrTail,
}

impl FfmpegMuxSink {
    pub fn build_args(container: Container, selection: TrackSelection, path: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "warning",
            "-f",
            "mpegts",
            "-i",
            "pipe:0",
        ]
        .map(String::from)
        .to_vec();

        if selection.video {
            args.extend(["-map", "0:v?"].map(String::from));
        }
        if selection.audio {
            args.extend(["-map", "0:a?"].map(String::from));
        }
        args.extend(["-c", "copy"].map(String::from));

        if container == Container::Mp4 {
            // Fragmented output keeps a truncated file playable.
            args.extend(["-movflags", "+frag_keyframe+empty_moov+default_base_moof"].map(String::from));
        }

        args.extend([
            "-f".to_string(),
            container.muxer().to_string(),
            "-n".to_string(),
            path.to_string_lossy().into_owned(),
        ]);
        args
    }

    pub fn spawn(
        program: &str,
        container: Container,
        selection: TrackSelection,
        path: &Path,
    ) -> Result<Self, StreamError> {
        let mut child = media_command(program)
            .args(Self::build_args(container, selection, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| StreamError::Mux {
                path: path.to_path_buf(),
                detail: format!("failed to spawn {program}: {e}"),
            })?;

        let tail = StderrTail::new(STDERR_TAIL_LINES);
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_forwarder(stderr, "ffmpeg-mux", tail.clone()));
        let stdin = child
            .stdin
            .take()
            .map(|stdin| BufWriter::with_capacity(WRITE_BUFFER, stdin));

        debug!(path = %path.display(), pid = ?child.id(), "Muxer started");
        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdin,
            stderr_task,
            tail,
        })
    }

    fn mux_error(&self, detail: impl std::fmt::Display) -> StreamError {
        let detail = if self.tail.is_empty() {
            detail.to_string()
        } else {
            format!("{detail}: {}", self.tail.joined())
        };
        StreamError::Mux {
            path: self.path.clone(),
            detail,
        }
    }
}

#[async_trait]
impl SegmentSink for FfmpegMuxSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_packet(&mut self, packet: &TsPacket) -> Result<(), StreamError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.mux_error("muxer input already closed"));
        };
        if let Err(e) = stdin.write_all(packet.as_bytes()).await {
            return Err(self.mux_error(e));
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, StreamError> {
        let flushed = match self.stdin.take() {
            // Dropping stdin signals end of input to the muxer.
            Some(mut stdin) => stdin.flush().await,
            None => Ok(()),
        };

        let outcome = wait_with_grace(&mut self.child, MUX_FINALIZE_GRACE).await;
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }

        if !outcome.success() {
            return Err(self.mux_error(format!("muxer ended with {outcome:?}")));
        }
        if let Err(e) = flushed {
            return Err(self.mux_error(e));
        }

        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .map_err(|e| StreamError::sink(&self.path, e))
    }
}

/// Open the sink matching `container`.
pub async fn open_sink(
    program: &str,
    container: Container,
    selection: TrackSelection,
    path: &Path,
) -> Result<Box<dyn SegmentSink>, StreamError> {
    match container {
        Container::Ts => Ok(Box::new(TsFileSink::create(path).await?)),
        Container::Mkv | Container::Mp4 => Ok(Box::new(FfmpegMuxSink::spawn(
            program, container, selection, path,
        )?)),
    }
}
