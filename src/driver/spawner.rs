//! Driver process spawner.
//!
//! Launches the driver as `[interpreter, driver_script, debug_log?]` with:
//! - the caller's environment, the configured overrides, and
//!   [`UNBUFFERED_ENV`] so diagnostics arrive as soon as they are written;
//! - all three standard streams piped;
//! - `kill_on_drop(true)` so a dropped handle never leaks the process.
//!
//! [`ChildHandle`] owns the process and its pipes and answers liveness
//! queries without blocking.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::{EvalError, Result};

// ── Environment ──────────────────────────────────────────────────────────────

/// Environment override forcing unbuffered stdio in the interpreter.
pub const UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

// ── Child handle ─────────────────────────────────────────────────────────────

/// Owned handle to a spawned driver process and its standard streams.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
    exit_status: Option<ExitStatus>,
}

impl ChildHandle {
    /// Spawn the driver described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Startup` when the interpreter or driver script does
    /// not exist, the OS refuses to spawn the process, or a pipe could not be
    /// captured.
    pub fn spawn(config: &DriverConfig) -> Result<Self> {
        ensure_file(&config.interpreter, "interpreter")?;
        ensure_file(&config.driver_script, "driver script")?;

        let mut cmd = Command::new(&config.interpreter);
        cmd.args(config.args());

        // Inherit the caller's environment; overrides win, the unbuffered
        // switch wins over everything.
        cmd.envs(&config.env);
        cmd.env(UNBUFFERED_ENV.0, UNBUFFERED_ENV.1);

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            interpreter = %config.interpreter.display(),
            script = %config.driver_script.display(),
            "spawning driver"
        );

        let mut child = cmd
            .spawn()
            .map_err(|err| startup(format!("failed to spawn driver: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| startup("failed to capture driver stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| startup("failed to capture driver stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| startup("failed to capture driver stderr"))?;

        let pid = child.id();
        info!(pid = pid.unwrap_or(0), "driver process spawned");

        Ok(Self {
            child,
            pid,
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            stderr: Some(stderr),
            exit_status: None,
        })
    }

    /// OS process identifier captured at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once the process has been observed to exit.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Whether the process has not yet exited. Never blocks.
    ///
    /// A failure to query the status is treated as exited.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = self.pid.unwrap_or(0), %status, "driver process exited");
                self.exit_status = Some(status);
                false
            }
            Err(err) => {
                warn!(pid = self.pid.unwrap_or(0), %err, "failed to poll driver process status");
                false
            }
        }
    }

    /// Whether the process exits within `window`, reaping it if so.
    ///
    /// Returns `true` at once when the exit was already observed. A failure
    /// to wait is treated as exited, matching [`Self::is_alive`].
    pub async fn exited_within(&mut self, window: Duration) -> bool {
        if !self.is_alive() {
            return true;
        }
        match tokio::time::timeout(window, self.child.wait()).await {
            Err(_elapsed) => false,
            Ok(Ok(status)) => {
                debug!(pid = self.pid.unwrap_or(0), %status, "driver process exited");
                self.exit_status = Some(status);
                true
            }
            Ok(Err(err)) => {
                warn!(pid = self.pid.unwrap_or(0), %err, "failed to wait for driver process");
                true
            }
        }
    }

    /// Collect whatever the driver left on stdout, reading for at most
    /// `window`.
    ///
    /// Meant for an exited driver, whose stdout reaches end of stream as soon
    /// as the buffered bytes are consumed. Returns `None` when nothing was
    /// left.
    pub async fn read_leftover_stdout(&mut self, window: Duration) -> Option<Vec<u8>> {
        let stdout = self.stdout.as_mut()?;
        let mut leftover = Vec::new();
        match tokio::time::timeout(window, stdout.read_to_end(&mut leftover)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => debug!(%err, "failed to read leftover driver stdout"),
            Err(_elapsed) => debug!("driver stdout still open after exit"),
        }
        (!leftover.is_empty()).then_some(leftover)
    }

    /// Request termination without waiting for it. No-op once exited.
    ///
    /// Sends `SIGTERM` on Unix so the driver can flush its own logs; other
    /// platforms fall back to a kill request.
    pub fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }
        info!(pid = self.pid.unwrap_or(0), "terminating driver process");
        if let Err(err) = self.signal_terminate() {
            warn!(pid = self.pid.unwrap_or(0), %err, "failed to terminate driver process");
        }
    }

    /// Await process exit and release every stream handle.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Io` if waiting on the process fails.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = match self.exit_status {
            Some(status) => status,
            None => {
                let status = self
                    .child
                    .wait()
                    .await
                    .map_err(|err| EvalError::Io(format!("failed to wait for driver: {err}")))?;
                self.exit_status = Some(status);
                status
            }
        };
        self.close_streams();
        Ok(status)
    }

    /// Terminate the process, optionally awaiting its exit.
    ///
    /// Idempotent and safe after the process already exited. With
    /// `wait == false` this returns immediately and leaves the streams open
    /// for the drop path to release.
    pub async fn shutdown(&mut self, wait: bool) {
        self.terminate();
        if !wait {
            return;
        }
        if let Err(err) = self.wait().await {
            warn!(pid = self.pid.unwrap_or(0), %err, "driver shutdown wait failed");
        }
    }

    /// Hand the diagnostic stream to a drainer. Returns `None` once taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Driver input stream, if still open.
    pub fn stdin_mut(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Buffered driver output stream, if still open.
    pub fn stdout_mut(&mut self) -> Option<&mut BufReader<ChildStdout>> {
        self.stdout.as_mut()
    }

    fn close_streams(&mut self) {
        self.stdin = None;
        self.stdout = None;
        self.stderr = None;
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = self.child.id().and_then(|id| i32::try_from(id).ok()) else {
            return Ok(());
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(std::io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn ensure_file(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(startup(format!("{what} not found: {}", path.display())))
    }
}

fn startup(reason: impl Into<String>) -> EvalError {
    EvalError::Startup {
        reason: reason.into(),
        stderr: Vec::new(),
    }
}
