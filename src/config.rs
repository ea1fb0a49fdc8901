//! Driver launch configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{EvalError, Result};

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Settings for launching and talking to one driver process.
///
/// The process is invoked as `[interpreter, driver_script, debug_log?]`
/// with the caller's environment plus [`DriverConfig::env`] overrides.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DriverConfig {
    /// Interpreter binary that hosts the driver script.
    pub interpreter: PathBuf,
    /// Script executed by the interpreter; speaks the line protocol.
    pub driver_script: PathBuf,
    /// Optional log file path handed to the driver as its third argument.
    #[serde(default)]
    pub debug_log: Option<PathBuf>,
    /// Extra environment variables set on the driver process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Upper bound of a single readiness poll, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl DriverConfig {
    /// Build a configuration with default poll interval and no overrides.
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>, driver_script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            driver_script: driver_script.into(),
            debug_log: None,
            env: BTreeMap::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }

    /// Pass `path` to the driver as its debug log destination.
    #[must_use]
    pub fn with_debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_log = Some(path.into());
        self
    }

    /// Add one environment override for the driver process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the readiness poll interval.
    ///
    /// The interval is stored in whole milliseconds; any non-zero interval
    /// shorter than that rounds up to 1 ms.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let millis = interval.as_nanos().div_ceil(1_000_000);
        self.poll_interval_ms = u64::try_from(millis).unwrap_or(u64::MAX);
        self
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| EvalError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Readiness poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Argument vector passed to the interpreter.
    #[must_use]
    pub fn args(&self) -> Vec<&Path> {
        let mut args = vec![self.driver_script.as_path()];
        if let Some(log) = &self.debug_log {
            args.push(log.as_path());
        }
        args
    }

    /// Check invariants that do not depend on the file system.
    ///
    /// Path existence is checked when the driver is started so that a
    /// missing interpreter surfaces as a startup failure.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Config` when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EvalError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.interpreter.as_os_str().is_empty() {
            return Err(EvalError::Config("interpreter must not be empty".into()));
        }

        if self.driver_script.as_os_str().is_empty() {
            return Err(EvalError::Config("driver_script must not be empty".into()));
        }

        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(EvalError::Config(format!(
                "invalid environment variable name '{key}'"
            )));
        }

        Ok(())
    }
}
