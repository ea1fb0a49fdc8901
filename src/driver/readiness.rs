//! Readiness polling on the driver's stdout.
//!
//! Each iteration checks liveness first, then waits at most one poll
//! interval for buffered data. Once data is available exactly one line is
//! read; the driver writes whole lines, so that read completes promptly.
//! There is no overall deadline: a live driver that never answers keeps
//! the caller waiting.

use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tracing::debug;

use crate::driver::spawner::ChildHandle;

/// Default upper bound of a single readiness poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal outcome of a readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// One line of raw bytes was read, terminator included when present.
    ///
    /// Kept as bytes so that invalid UTF-8 is reported by the decoder
    /// instead of being mistaken for a dead stream.
    Line(Vec<u8>),
    /// The driver exited before producing a line.
    Died,
    /// Stdout reached end of stream or could not be read.
    Closed,
}

/// Bounded-iteration wait for driver output.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessWaiter {
    poll_interval: Duration,
}

impl ReadinessWaiter {
    /// Create a waiter polling at most `poll_interval` per iteration.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Per-iteration poll bound.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `child` has a line on stdout or is gone.
    pub async fn wait_for_line(&self, child: &mut ChildHandle) -> Readiness {
        debug!("waiting for driver output");
        loop {
            if !child.is_alive() {
                debug!("driver died while waiting for output");
                return Readiness::Died;
            }

            let Some(stdout) = child.stdout_mut() else {
                return Readiness::Closed;
            };

            // `fill_buf` is cancel safe: a timed-out poll loses no data.
            let at_eof = match tokio::time::timeout(self.poll_interval, stdout.fill_buf()).await {
                Err(_elapsed) => continue,
                Ok(Err(err)) => {
                    debug!(%err, "driver stdout unreadable");
                    return Readiness::Closed;
                }
                Ok(Ok(buf)) => buf.is_empty(),
            };
            if at_eof {
                debug!("driver stdout reached end of stream");
                return Readiness::Closed;
            }

            let mut line = Vec::new();
            return match stdout.read_until(b'\n', &mut line).await {
                Ok(_) => {
                    debug!(bytes = line.len(), "driver output line received");
                    Readiness::Line(line)
                }
                Err(err) => {
                    debug!(%err, "failed to read driver output line");
                    Readiness::Closed
                }
            };
        }
    }
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
