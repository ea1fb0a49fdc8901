//! Evaluation request model.
//!
//! The payload types are opaque to this crate: `data` and `times` are any
//! serializable values the driver understands. Only the options envelope
//! has a partially typed shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tangent computation mode requested from the driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TangentMode {
    /// Let the driver pick tangents automatically.
    Auto,
    /// Request smoothed tangents.
    Smooth,
}

/// Named flags sent alongside a request.
///
/// Unknown flags are carried verbatim in [`EvalOptions::extra`] so callers
/// can pass driver-specific switches without changing this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalOptions {
    /// Tangent computation mode; omitted from the wire when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_tan_method: Option<TangentMode>,
    /// Additional caller-defined flags.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EvalOptions {
    /// Set the tangent computation mode.
    #[must_use]
    pub fn with_tangent_mode(mut self, mode: TangentMode) -> Self {
        self.auto_tan_method = Some(mode);
        self
    }

    /// Set an arbitrary named flag.
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// One evaluation request: payload data, sample times and options.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<D, T> {
    /// Payload describing what to evaluate.
    pub data: D,
    /// Payload describing where to evaluate it.
    pub times: T,
    /// Named flags.
    pub options: EvalOptions,
}

impl<D, T> Request<D, T> {
    /// Build a request with default options.
    pub fn new(data: D, times: T) -> Self {
        Self {
            data,
            times,
            options: EvalOptions::default(),
        }
    }

    /// Replace the options of this request.
    #[must_use]
    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }
}
