//! SockJS frame encoding and payload decoding.
//!
//! Outbound frames are single-letter tagged strings:
//!
//! ```text
//! o                      session opened
//! h                      heartbeat
//! a["msg1","msg2"]       messages
//! c[3000,"Go away!"]     session closed
//! ```
//!
//! Inbound payloads are a JSON array of strings, or (websocket only) a
//! single JSON string.

use serde_json::Value;
use thiserror::Error;

/// Open frame.
pub const OPEN: &str = "o";

/// Heartbeat frame.
pub const HEARTBEAT: &str = "h";

/// Close code used when a handler closes without one.
pub const DEFAULT_CLOSE_CODE: u16 = 1000;

/// Close reason used when a handler closes without one.
pub const DEFAULT_CLOSE_REASON: &str = "Normal closure";

/// Payload decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload expected.")]
    Empty,
    #[error("Broken JSON encoding.")]
    BrokenJson,
}

/// Close frame carried by a closing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Frame sent when a second receiver polls an attached session.
    pub fn another_connection() -> Self {
        Self::new(2010, "Another connection still open")
    }

    /// Encode as `c[code,"reason"]`.
    pub fn encode(&self) -> String {
        format!("c{}", serde_json::json!([self.code, self.reason]))
    }
}

impl Default for CloseFrame {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSE_CODE, DEFAULT_CLOSE_REASON)
    }
}

/// Encode a batch of messages as `a[...]`.
pub fn messages(batch: &[String]) -> String {
    format!("a{}", Value::from(batch))
}

/// Decode an inbound payload into its messages.
pub fn decode(payload: &str) -> Result<Vec<String>, FrameError> {
    if payload.trim().is_empty() {
        return Err(FrameError::Empty);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(message)) => Ok(vec![message]),
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(message) => Ok(message),
                _ => Err(FrameError::BrokenJson),
            })
            .collect(),
        _ => Err(FrameError::BrokenJson),
    }
}

/// Terminate a frame for the polling transports.
pub fn line(frame: &str) -> String {
    let mut out = String::with_capacity(frame.len() + 1);
    out.push_str(frame);
    out.push('\n');
    out
}
