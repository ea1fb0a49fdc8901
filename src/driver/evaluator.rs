//! Request/response orchestration over one driver process.
//!
//! # Lifecycle
//!
//! 1. [`Evaluator::start`] spawns the driver, starts the stderr drainer and
//!    waits for the handshake: a single empty line on stdout.
//! 2. [`Evaluator::eval`] writes one request line and waits for one
//!    response line. Only one request is ever in flight; `&mut self`
//!    enforces that.
//! 3. [`Evaluator::shutdown`] (or the non-waiting
//!    [`Evaluator::start_shutdown`], also run on drop) stops the drainer and
//!    terminates the driver.
//!
//! Any observed driver exit moves the evaluator to [`RunState::Dead`] for
//! good. Nothing is retried and the driver is never restarted.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::driver::drainer::StderrDrainer;
use crate::driver::protocol;
use crate::driver::readiness::{Readiness, ReadinessWaiter};
use crate::driver::spawner::ChildHandle;
use crate::models::request::Request;
use crate::models::state::RunState;
use crate::{EvalError, Result};

// ── Evaluator ────────────────────────────────────────────────────────────────

/// Lower bound on how long a death path waits for the drainer to reach end
/// of stream. The wait ends early as soon as the pipe closes.
const MIN_SETTLE_WINDOW: Duration = Duration::from_secs(1);

/// Supervisor for one long-lived driver process.
#[derive(Debug)]
pub struct Evaluator {
    config: DriverConfig,
    child: ChildHandle,
    drainer: StderrDrainer,
    waiter: ReadinessWaiter,
    state: RunState,
    /// Every diagnostic line drained so far, in arrival order.
    diagnostics: Vec<String>,
}

impl Evaluator {
    /// Launch the driver and complete the startup handshake.
    ///
    /// # Errors
    ///
    /// - `EvalError::Config` — `config` fails validation.
    /// - `EvalError::Startup` — interpreter or script missing, spawn failure,
    ///   or the driver exited (or closed stdout) before the handshake line.
    ///   Captured diagnostics are attached.
    pub async fn start(config: DriverConfig) -> Result<Self> {
        config.validate()?;

        let mut child = ChildHandle::spawn(&config)?;
        let stderr = child.take_stderr().ok_or_else(|| EvalError::Startup {
            reason: "driver stderr already taken".into(),
            stderr: Vec::new(),
        })?;
        let drainer = StderrDrainer::start(stderr);
        let waiter = ReadinessWaiter::new(config.poll_interval());

        let mut evaluator = Self {
            config,
            child,
            drainer,
            waiter,
            state: RunState::Starting,
            diagnostics: Vec::new(),
        };

        match evaluator.read_from_child().await {
            Ok(line) => {
                if !line.is_empty() {
                    warn!(line = %line, "driver handshake line was not empty; accepting");
                }
                evaluator.transition(RunState::Running);
                info!(pid = evaluator.pid().unwrap_or(0), "driver ready");
                Ok(evaluator)
            }
            Err(err) => {
                evaluator.start_shutdown();
                let reason = match err {
                    EvalError::ChildDeath { reason, .. } => {
                        format!("driver exited before handshake: {reason}")
                    }
                    other => format!("driver handshake failed: {other}"),
                };
                Err(EvalError::Startup {
                    reason,
                    stderr: std::mem::take(&mut evaluator.diagnostics),
                })
            }
        }
    }

    /// Send `request` and return the decoded samples.
    ///
    /// Waits, one poll interval at a time, for as long as the driver stays
    /// alive; there is no per-request timeout.
    ///
    /// # Errors
    ///
    /// - `EvalError::NotRunning` — the driver already exited or was shut down.
    /// - `EvalError::Encode` — `request` cannot be serialised; state unchanged.
    /// - `EvalError::ChildDeath` — the driver died, closed stdout, or refused
    ///   input while the request was outstanding.
    /// - `EvalError::Decode` — the response line is malformed and the driver
    ///   is still alive a settle window later; the evaluator stays running.
    pub async fn eval<D, T, R>(&mut self, request: &Request<D, T>) -> Result<Vec<R>>
    where
        D: Serialize,
        T: Serialize,
        R: DeserializeOwned,
    {
        self.refresh_state();
        if !self.state.accepts_requests() {
            return Err(EvalError::NotRunning(format!("driver is {}", self.state)));
        }

        let Some(stdin) = self.child.stdin_mut() else {
            return Err(EvalError::NotRunning("driver stdin is closed".into()));
        };

        match protocol::write_request(stdin, request).await {
            Ok(()) => debug!("request sent to driver"),
            Err(EvalError::Io(msg)) => {
                return Err(self
                    .fail_dead(format!("failed to send request: {msg}"), None)
                    .await);
            }
            Err(other) => return Err(other),
        }

        let line = self.read_from_child().await?;
        match protocol::decode_response(&line) {
            Ok(samples) => Ok(samples),
            Err(err) => Err(self.check_bad_line(err, line).await),
        }
    }

    /// Stop the drainer, terminate the driver, and wait for both to finish.
    ///
    /// Idempotent; safe after the driver already exited on its own.
    pub async fn shutdown(&mut self) {
        self.start_shutdown();
        self.child.shutdown(true).await;
        self.drainer.join().await;
        self.collect_diagnostics();
        debug!("driver shutdown complete");
    }

    /// Best-effort, non-waiting shutdown.
    ///
    /// Signals the drainer and the driver and returns at once; neither is
    /// guaranteed to have stopped on return. Runs automatically on drop.
    pub fn start_shutdown(&mut self) {
        self.drainer.stop();
        self.child.terminate();
        self.transition(RunState::Dead);
    }

    /// Current lifecycle state as last observed.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Re-check driver liveness and report whether requests are accepted.
    pub fn is_running(&mut self) -> bool {
        self.refresh_state();
        self.state.accepts_requests()
    }

    /// Driver process identifier.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.pid()
    }

    /// Configuration the driver was launched with.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Full diagnostic transcript, including lines queued since the last call.
    pub fn diagnostics(&mut self) -> &[String] {
        self.collect_diagnostics();
        &self.diagnostics
    }

    /// Wait for one line and confirm the driver survived producing it.
    async fn read_from_child(&mut self) -> Result<String> {
        let outcome = self.waiter.wait_for_line(&mut self.child).await;
        let alive = self.child.is_alive();
        self.collect_diagnostics();

        match outcome {
            Readiness::Line(bytes) if alive => match String::from_utf8(bytes) {
                Ok(text) => Ok(strip_line_terminator(text)),
                Err(err) => {
                    let partial = lossy_line(err.as_bytes());
                    let decode = EvalError::Decode(format!(
                        "response is not valid utf-8: {}",
                        err.utf8_error()
                    ));
                    Err(self.check_bad_line(decode, partial).await)
                }
            },
            Readiness::Line(bytes) => {
                let partial = lossy_line(&bytes);
                Err(self
                    .fail_dead("driver exited after writing output".into(), Some(partial))
                    .await)
            }
            Readiness::Died => {
                // The last line may still sit in the pipe behind the exit.
                let window = self.settle_window();
                let partial = self
                    .child
                    .read_leftover_stdout(window)
                    .await
                    .map(|bytes| lossy_line(&bytes));
                Err(self
                    .fail_dead("driver exited while waiting for output".into(), partial)
                    .await)
            }
            Readiness::Closed => Err(self
                .fail_dead("driver closed its output stream".into(), None)
                .await),
        }
    }

    /// Decide whether an undecodable line came from a live driver or was the
    /// last output of a dying one.
    ///
    /// A driver that exits within the settle window turns `err` into a
    /// death error carrying `line` as partial stdout; otherwise `err` is
    /// returned unchanged and the evaluator stays running.
    async fn check_bad_line(&mut self, err: EvalError, line: String) -> EvalError {
        let window = self.settle_window();
        if self.child.exited_within(window).await {
            self.fail_dead("driver exited after writing output".into(), Some(line))
                .await
        } else {
            debug!(%err, "driver answered with an undecodable line");
            err
        }
    }

    fn settle_window(&self) -> Duration {
        self.waiter.poll_interval().max(MIN_SETTLE_WINDOW)
    }

    /// Mark the driver dead and build a death error with every captured line.
    async fn fail_dead(&mut self, what: String, stdout: Option<String>) -> EvalError {
        self.transition(RunState::Dead);
        self.child.terminate();

        // Lines still in the pipe must reach the transcript before it is
        // frozen into the error.
        let window = self.settle_window();
        self.drainer.settle(window).await;
        self.collect_diagnostics();

        let reason = match self.child.exit_status() {
            Some(status) => format!("{what} ({status})"),
            None => what,
        };
        warn!(
            pid = self.pid().unwrap_or(0),
            reason = %reason,
            stderr_lines = self.diagnostics.len(),
            "driver failure"
        );
        if let Some(out) = stdout.as_deref() {
            debug!(stdout = %out, "driver partial stdout");
        }

        EvalError::ChildDeath {
            reason,
            stderr: self.diagnostics.clone(),
            stdout,
        }
    }

    fn refresh_state(&mut self) {
        if self.state != RunState::Dead && !self.child.is_alive() {
            info!(pid = self.pid().unwrap_or(0), "driver no longer running");
            self.transition(RunState::Dead);
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state == next {
            return;
        }
        if self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "evaluator state change");
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "ignoring invalid evaluator state change");
        }
    }

    fn collect_diagnostics(&mut self) {
        let lines = self.drainer.drain();
        if lines.is_empty() {
            return;
        }
        debug!(count = lines.len(), "driver stderr drained");
        self.diagnostics.extend(lines);
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        self.start_shutdown();
    }
}

// ── Line helpers ─────────────────────────────────────────────────────────────

/// Remove one trailing `\n` (and a preceding `\r`) if present.
fn strip_line_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Lossy text of a raw stdout line, terminator removed.
fn lossy_line(bytes: &[u8]) -> String {
    strip_line_terminator(String::from_utf8_lossy(bytes).into_owned())
}
