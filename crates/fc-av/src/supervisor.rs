//! Lifecycle of a single encoder subprocess.
//!
//! [`EncoderProcess`] launches ffmpeg with stdout carrying the `-progress`
//! protocol and stderr carrying diagnostics, feeds every stdout line through
//! [`crate::progress::parse_line`], and resolves to exactly one
//! [`EncodeOutcome`]. It never returns an error: launch failures, I/O errors
//! and non-zero exits all become [`EncodeOutcome::Failure`].
//!
//! stderr is drained on its own task so a chatty encoder can never fill the
//! pipe and stall while we are blocked on stdout.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use fc_core::ProgressField;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::progress;

/// Default time between SIGTERM and SIGKILL.
const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// Number of trailing stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 50;

/// How long to wait for the stderr task after the process has exited.
const STDERR_SETTLE: Duration = Duration::from_secs(2);

/// Where a supervised process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl SupervisorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal result of one supervised encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    Failure {
        /// One-line summary, e.g. `ffmpeg exited with exit code 1`.
        message: String,
        /// Trailing stderr output, possibly empty.
        diagnostics: String,
    },
    Cancelled,
}

impl EncodeOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            diagnostics: String::new(),
        }
    }

    /// Summary plus diagnostics, suitable for a `failed` event.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Failure {
                message,
                diagnostics,
            } if diagnostics.is_empty() => Some(message.clone()),
            Self::Failure {
                message,
                diagnostics,
            } => Some(format!("{message}\n{diagnostics}")),
            _ => None,
        }
    }
}

/// Supervises one encoder subprocess from launch to a terminal outcome.
#[derive(Debug)]
pub struct EncoderProcess {
    program: PathBuf,
    args: Vec<String>,
    duration_secs: Option<f64>,
    terminate_grace: Duration,
    state: SupervisorState,
}

impl EncoderProcess {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            duration_secs: None,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            state: SupervisorState::NotStarted,
        }
    }

    /// Input duration used to turn encoded time into a percentage.
    pub fn duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Time allowed between the graceful stop request and a hard kill.
    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn transition(&mut self, next: SupervisorState) {
        tracing::debug!(program = %self.program_name(), "encoder {} -> {}", self.state, next);
        self.state = next;
    }

    fn finish(&mut self, outcome: EncodeOutcome) -> EncodeOutcome {
        let next = match outcome {
            EncodeOutcome::Success => SupervisorState::Succeeded,
            EncodeOutcome::Failure { .. } => SupervisorState::Failed,
            EncodeOutcome::Cancelled => SupervisorState::Cancelled,
        };
        self.transition(next);
        outcome
    }

    /// Run the encoder to completion.
    ///
    /// `on_progress` receives every recognized progress field in line order.
    /// Lines on stderr that mention an error go to `errors`. `cancel` is
    /// checked before each stdout line and also interrupts a read that is
    /// waiting on a silent encoder, or the wait for exit after stdout closes.
    ///
    /// A process can be run once; later calls return a failure.
    pub async fn run(
        &mut self,
        mut on_progress: impl FnMut(ProgressField),
        errors: Option<UnboundedSender<String>>,
        cancel: Option<&CancellationToken>,
    ) -> EncodeOutcome {
        if self.state != SupervisorState::NotStarted {
            return EncodeOutcome::failure(format!("encoder process already {}", self.state));
        }

        let name = self.program_name();
        tracing::info!("Starting {name}");
        tracing::debug!("{} {}", self.program.display(), self.args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {name}: {e}");
                tracing::error!("{message}");
                report(errors.as_ref(), &message);
                return self.finish(EncodeOutcome::failure(message));
            }
        };
        self.transition(SupervisorState::Running);

        let drain = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, errors.clone())));

        let Some(stdout) = child.stdout.take() else {
            let message = format!("{name} stdout was not captured");
            report(errors.as_ref(), &message);
            self.terminate(&mut child, drain).await;
            return self.finish(EncodeOutcome::failure(message));
        };
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return self.stop_cancelled(&mut child, drain).await;
            }

            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    line = read_line(&mut reader, &mut buf) => Some(line),
                },
                None => Some(read_line(&mut reader, &mut buf).await),
            };

            match next {
                None => return self.stop_cancelled(&mut child, drain).await,
                Some(Ok(Some(line))) => {
                    if let Some(field) = progress::parse_line(&line, self.duration_secs) {
                        on_progress(field);
                    }
                }
                Some(Ok(None)) => break,
                Some(Err(e)) => {
                    let message = format!("error reading {name} output: {e}");
                    tracing::error!("{message}");
                    report(errors.as_ref(), &message);
                    self.terminate(&mut child, drain).await;
                    return self.finish(EncodeOutcome::failure(message));
                }
            }
        }

        // stdout can close while the encoder is still finalising the output.
        let waited = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                status = child.wait() => Some(status),
            },
            None => Some(child.wait().await),
        };

        let status = match waited {
            None => return self.stop_cancelled(&mut child, drain).await,
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                let message = format!("error waiting for {name}: {e}");
                report(errors.as_ref(), &message);
                return self.finish(EncodeOutcome::failure(message));
            }
        };
        tracing::info!("{name} completed with {status}");

        let diagnostics = collect_stderr(drain).await;

        if status.success() {
            return self.finish(EncodeOutcome::Success);
        }

        let message = match status.code() {
            Some(code) => format!("{name} exited with exit code {code}"),
            None => format!("{name} terminated by signal ({status})"),
        };
        tracing::error!("{message}");
        if !diagnostics.is_empty() {
            tracing::error!("{name} stderr:\n{diagnostics}");
        }
        report(errors.as_ref(), &message);

        self.finish(EncodeOutcome::Failure {
            message,
            diagnostics,
        })
    }

    async fn stop_cancelled(&mut self, child: &mut Child, drain: Option<JoinHandle<String>>) -> EncodeOutcome {
        tracing::info!("Cancellation requested, terminating {}", self.program_name());
        self.terminate(child, drain).await;
        self.finish(EncodeOutcome::Cancelled)
    }

    /// Graceful stop, bounded wait, then kill. Always reaps the child.
    async fn terminate(&self, child: &mut Child, drain: Option<JoinHandle<String>>) {
        request_stop(child);

        match tokio::time::timeout(self.terminate_grace, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("{} stopped with {status}", self.program_name()),
            Ok(Err(e)) => tracing::warn!("Error waiting for {}: {e}", self.program_name()),
            Err(_) => {
                tracing::warn!(
                    "{} did not exit within {:?}, killing it",
                    self.program_name(),
                    self.terminate_grace
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill {}: {e}", self.program_name());
                }
            }
        }

        if let Some(handle) = drain {
            handle.abort();
        }
    }
}

/// Ask the child to exit: SIGTERM on unix, a hard kill elsewhere.
#[cfg(unix)]
fn request_stop(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        let _ = child.start_kill();
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::debug!("SIGTERM to {pid} failed ({e}); killing");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to stop encoder: {e}");
    }
}

fn report(errors: Option<&UnboundedSender<String>>, message: &str) {
    if let Some(tx) = errors {
        let _ = tx.send(message.to_string());
    }
}

/// Read one line as lossy UTF-8 without its line terminator.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string()))
}

/// Heuristic for stderr lines worth surfacing; not a parser of ffmpeg's log format.
fn looks_like_error(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error") || lower.contains("failed")
}

/// Read stderr to EOF, forwarding error-looking lines and keeping the tail.
async fn drain_stderr(stderr: ChildStderr, errors: Option<UnboundedSender<String>>) -> String {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        match read_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if looks_like_error(&line) {
                    tracing::warn!("ffmpeg: {line}");
                    report(errors.as_ref(), &line);
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("stderr read failed: {e}");
                break;
            }
        }
    }

    Vec::from(tail).join("\n")
}

async fn collect_stderr(drain: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = drain else {
        return String::new();
    };
    match tokio::time::timeout(STDERR_SETTLE, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            tracing::debug!("stderr task failed: {e}");
            String::new()
        }
        Err(_) => {
            // A grandchild may still hold the pipe open.
            handle.abort();
            String::new()
        }
    }
}
