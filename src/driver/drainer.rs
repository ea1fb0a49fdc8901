//! Diagnostic stream drainer.
//!
//! A background task reads the driver's stderr line by line (framed by
//! [`DiagnosticCodec`]) and publishes each line on an unbounded
//! [`mpsc`] channel. The evaluator drains that channel without waiting
//! whenever it has finished reading from the driver's stdout.
//!
//! The exit flag is checked only after a read attempt completes. A driver
//! that keeps stderr open but silent therefore parks the task until the
//! process is terminated and the pipe closes.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::codec::DiagnosticCodec;

/// Background reader for one driver's diagnostic stream.
#[derive(Debug)]
pub struct StderrDrainer {
    lines: mpsc::UnboundedReceiver<String>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StderrDrainer {
    /// Spawn the drain task over `stderr`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R>(stderr: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let task = tokio::spawn(run_drainer(stderr, tx, stop.clone()));
        Self {
            lines: rx,
            stop,
            task: Some(task),
        }
    }

    /// Take every line captured so far, in arrival order. Never waits.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            out.push(line);
        }
        out
    }

    /// Ask the task to exit after its current read attempt.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Whether the task has finished (stream closed or stopped).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the task to reach end of stream.
    ///
    /// Used after the driver died so that lines still in flight in the pipe
    /// are captured before an error is built. Returns whether the task
    /// finished within the window.
    pub async fn settle(&mut self, timeout: Duration) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };
        match tokio::time::timeout(timeout, task).await {
            Ok(result) => {
                if let Err(err) = result {
                    warn!(%err, "stderr drainer task failed");
                }
                self.task = None;
                true
            }
            Err(_elapsed) => {
                debug!(?timeout, "stderr drainer still running after settle window");
                false
            }
        }
    }

    /// Await task completion. Idempotent.
    ///
    /// The caller must have closed the stream (terminated the driver) or
    /// this waits for the next diagnostic line.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(%err, "stderr drainer task failed");
            }
        }
    }
}

/// Drain loop. Never returns an error; failures end the loop and are logged.
async fn run_drainer<R>(stderr: R, tx: mpsc::UnboundedSender<String>, stop: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(stderr, DiagnosticCodec::new());

    loop {
        match framed.next().await {
            Some(Ok(line)) => {
                debug!(line = %line, "driver stderr");
                if tx.send(line).is_err() {
                    debug!("stderr drainer: receiver dropped, stopping");
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(%err, "stderr drainer: read failed, stopping");
                break;
            }
            None => {
                debug!("stderr drainer: stream closed");
                break;
            }
        }

        if stop.is_cancelled() {
            debug!("stderr drainer: exit flag set, stopping");
            break;
        }
    }
}
