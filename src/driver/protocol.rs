//! Request/response envelopes exchanged with the driver.
//!
//! Every message is a single compact JSON object terminated by `\n`:
//!
//! ```json
//! {"version":1,"data":…,"times":…,"options":{"autoTanMethod":"smooth"}}
//! {"version":1,"samples":[…]}
//! ```
//!
//! Responses are decoded through a fixed schema; the driver's output is
//! never executed or interpreted beyond that.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::models::request::{EvalOptions, Request};
use crate::{EvalError, Result};

/// Wire schema version written to and expected from the driver.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Serialize)]
struct RequestEnvelope<'a, D, T> {
    version: u32,
    data: &'a D,
    times: &'a T,
    options: &'a EvalOptions,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResponseEnvelope<R> {
    version: u32,
    samples: Vec<R>,
}

/// Peek at the version before committing to the sample type, so a version
/// mismatch is reported as such rather than as a field error.
#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

/// Serialize `request` into one `\n`-terminated line.
///
/// # Errors
///
/// Returns [`EvalError::Encode`] when the payload cannot be represented as
/// JSON (for example a map with non-string keys).
pub fn encode_request<D, T>(request: &Request<D, T>) -> Result<String>
where
    D: Serialize,
    T: Serialize,
{
    let envelope = RequestEnvelope {
        version: PROTOCOL_VERSION,
        data: &request.data,
        times: &request.times,
        options: &request.options,
    };
    let mut line = serde_json::to_string(&envelope)
        .map_err(|e| EvalError::Encode(format!("failed to serialise request: {e}")))?;
    // Compact serde_json output escapes control characters, so this holds
    // for any payload.
    debug_assert!(!line.contains('\n'));
    line.push('\n');
    Ok(line)
}

/// Encode `request`, write it to `stdin`, and flush immediately.
///
/// # Errors
///
/// - [`EvalError::Encode`] if serialisation fails.
/// - [`EvalError::Io`] if the write or flush fails (e.g. the driver has
///   exited and the pipe is closed).
pub async fn write_request<W, D, T>(stdin: &mut W, request: &Request<D, T>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    D: Serialize,
    T: Serialize,
{
    let line = encode_request(request)?;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| EvalError::Io(format!("write failed: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| EvalError::Io(format!("flush failed: {e}")))
}

/// Decode one response line (terminator already stripped) into samples.
///
/// # Errors
///
/// Returns [`EvalError::Decode`] when the line is empty, truncated, not
/// JSON, carries a different protocol version, or its samples do not match
/// `R`.
pub fn decode_response<R>(line: &str) -> Result<Vec<R>>
where
    R: DeserializeOwned,
{
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Err(EvalError::Decode("empty response line".into()));
    }

    let probe: VersionProbe = serde_json::from_str(trimmed)
        .map_err(|e| EvalError::Decode(format!("malformed json: {e}")))?;
    match probe.version {
        Some(PROTOCOL_VERSION) => {}
        Some(other) => {
            return Err(EvalError::Decode(format!(
                "unsupported protocol version {other} (expected {PROTOCOL_VERSION})"
            )));
        }
        None => {
            return Err(EvalError::Decode("missing required field: version".into()));
        }
    }

    let envelope: ResponseEnvelope<R> = serde_json::from_str(trimmed)
        .map_err(|e| EvalError::Decode(format!("invalid response: {e}")))?;
    debug_assert_eq!(envelope.version, PROTOCOL_VERSION);
    Ok(envelope.samples)
}
