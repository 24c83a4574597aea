//! Small process-related helpers shared across the workspace.
//!
//! The recorder drives external media tools as child processes. These helpers
//! give every child the same treatment: no console window on Windows, killed
//! when its handle is dropped, stderr forwarded into `tracing` while the last
//! lines are kept for error reports, and bounded waits on shutdown.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a media tool.
///
/// stdin is closed, stdout/stderr are piped, the process is killed when the
/// `Child` is dropped and the locale is forced to `C` so tool output parses
/// the same everywhere.
pub fn media_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Rolling buffer holding the last lines a process wrote to stderr.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The retained lines joined with `" | "`.
    pub fn joined(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join(" | ")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

/// Forward a child's stderr into `tracing`, keeping the tail in `tail`.
///
/// Lines mentioning an error are logged at warn level, everything else at
/// debug. The task ends when the stream closes.
pub fn spawn_stderr_forwarder<R>(stderr: R, label: &'static str, tail: StderrTail) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.to_ascii_lowercase().contains("error") {
                        warn!(process = label, "{}", trimmed);
                    } else {
                        debug!(process = label, "{}", trimmed);
                    }
                    tail.push(trimmed.to_string());
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(process = label, error = %e, "stderr stream closed");
                    break;
                }
            }
        }
    })
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own with the given code (`None` when killed by a signal).
    Exited(Option<i32>),
    /// The process did not exit within the grace period and was killed.
    Killed,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(Some(0)))
    }
}

/// Wait for `child` to exit, killing it if it is still running after `grace`.
pub async fn wait_with_grace(child: &mut Child, grace: Duration) -> ExitOutcome {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            let code = status.code();
            if let Some(c) = code
                && c != 0
            {
                warn!("Process exited with code: {}", c);
            }
            ExitOutcome::Exited(code)
        }
        Ok(Err(e)) => {
            error!("Error waiting for process: {}", e);
            ExitOutcome::Exited(Some(-1))
        }
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "Process did not exit in time, killing it");
            kill_and_reap(child).await;
            ExitOutcome::Killed
        }
    }
}

/// Kill `child` and reap it so no zombie is left behind.
pub async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Kill failed, process probably already exited");
    }
}
