//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Error enumeration covering every failure mode of a driver session.
///
/// None of these are retried internally. `Startup` and `ChildDeath` are
/// terminal for the evaluator instance; `Decode` and `Encode` only fail the
/// call that produced them.
#[derive(Debug)]
pub enum EvalError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The driver could not be launched or never completed its handshake.
    Startup {
        /// Human-readable cause.
        reason: String,
        /// Diagnostic lines the driver wrote before failing.
        stderr: Vec<String>,
    },
    /// A request was issued to an evaluator whose driver is no longer running.
    NotRunning(String),
    /// The driver exited (or closed its output) while a request was outstanding.
    ChildDeath {
        /// Human-readable cause, including the exit status when known.
        reason: String,
        /// Full diagnostic transcript captured from the driver.
        stderr: Vec<String>,
        /// Partial primary output observed before death, if any.
        stdout: Option<String>,
    },
    /// A response line did not match the wire schema.
    Decode(String),
    /// A request could not be serialized.
    Encode(String),
    /// File-system or pipe I/O failure.
    Io(String),
}

impl EvalError {
    /// Diagnostic lines attached to a death-related error.
    ///
    /// Returns an empty slice for variants that carry no diagnostics.
    #[must_use]
    pub fn stderr(&self) -> &[String] {
        match self {
            Self::Startup { stderr, .. } | Self::ChildDeath { stderr, .. } => stderr.as_slice(),
            _ => &[],
        }
    }

    /// Whether the error means the driver process is gone for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Startup { .. } | Self::NotRunning(_) | Self::ChildDeath { .. }
        )
    }
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Startup { reason, stderr } => {
                write!(f, "startup: {reason}")?;
                write_transcript(f, stderr)
            }
            Self::NotRunning(msg) => write!(f, "not running: {msg}"),
            Self::ChildDeath {
                reason,
                stderr,
                stdout,
            } => {
                write!(f, "child death: {reason}")?;
                if let Some(out) = stdout.as_deref().filter(|s| !s.is_empty()) {
                    write!(f, "\n--- driver stdout ---\n{out}")?;
                }
                write_transcript(f, stderr)
            }
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Encode(msg) => write!(f, "encode: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<toml::de::Error> for EvalError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for EvalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

fn write_transcript(f: &mut Formatter<'_>, lines: &[String]) -> std::fmt::Result {
    if lines.is_empty() {
        return Ok(());
    }
    write!(f, "\n--- driver stderr ---")?;
    for line in lines {
        write!(f, "\n{line}")?;
    }
    Ok(())
}
