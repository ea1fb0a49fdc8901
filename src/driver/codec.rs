//! Line framing for the driver's diagnostic stream.
//!
//! Diagnostic output is free-form text, so unlike a strict
//! [`LinesCodec`](tokio_util::codec::LinesCodec) this decoder never fails on
//! invalid UTF-8: bytes are decoded lossily. A single line is bounded by
//! [`MAX_LINE_BYTES`]; anything past the limit is dropped up to the next
//! newline so a runaway writer cannot exhaust memory.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use driver_host::driver::codec::DiagnosticCodec;
//!
//! let lines = FramedRead::new(child_stderr, DiagnosticCodec::new());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::EvalError;

/// Maximum bytes kept for a single diagnostic line: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited, lossy UTF-8 decoder with a per-line size cap.
#[derive(Debug)]
pub struct DiagnosticCodec {
    max_length: usize,
    /// Set while skipping the tail of an over-long line.
    discarding: bool,
}

impl DiagnosticCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom per-line limit (at least one byte).
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            discarding: false,
        }
    }

    /// Per-line byte limit.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for DiagnosticCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DiagnosticCodec {
    type Item = String;
    type Error = EvalError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` while no complete line is buffered. A line longer
    /// than the limit is emitted truncated and its remainder skipped.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src.iter().position(|b| *b == b'\n');

            if self.discarding {
                match newline {
                    Some(idx) => {
                        src.advance(idx + 1);
                        self.discarding = false;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
                continue;
            }

            return match newline {
                Some(idx) if idx <= self.max_length => {
                    let line = src.split_to(idx + 1);
                    Ok(Some(to_text(&line[..idx])))
                }
                Some(_) => {
                    let line = src.split_to(self.max_length);
                    self.discarding = true;
                    Ok(Some(to_text(&line)))
                }
                None if src.len() > self.max_length => {
                    let line = src.split_to(self.max_length);
                    self.discarding = true;
                    Ok(Some(to_text(&line)))
                }
                None => Ok(None),
            };
        }
    }

    /// Flush a final unterminated line when the stream closes.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(to_text(&rest)))
    }
}

/// Lossy UTF-8 conversion that also drops a trailing carriage return.
fn to_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
