//! Close-on-request endpoint.
//!
//! ```text
//! close                  close with the default code and reason
//! close:3001             close with code 3001
//! close:1000:bye         close with code 1000, reason "bye"
//! ```
//!
//! Anything not starting with `close` is ignored.

use tracing::info;

use super::parse_int_prefix;
use crate::sockjs::{Connection, Handler};

/// Parsed close request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub code: Option<u16>,
    pub reason: Option<String>,
}

/// Parse a close request, or `None` if the message is not one.
///
/// A code that is missing a number or does not fit a close code is dropped.
pub fn parse_close_request(message: &str) -> Option<CloseRequest> {
    if !message.starts_with("close") {
        return None;
    }

    let mut parts = message.split(':').skip(1);
    let code = parts
        .next()
        .and_then(parse_int_prefix)
        .and_then(|code| u16::try_from(code).ok());
    let reason = parts.next().map(str::to_string);

    Some(CloseRequest { code, reason })
}

pub struct CloseOnRequest;

impl Handler for CloseOnRequest {
    fn name(&self) -> &'static str {
        "close"
    }

    fn on_message(&self, conn: &Connection, message: &str) {
        if let Some(request) = parse_close_request(message) {
            info!(
                endpoint = "close",
                session = conn.id(),
                code = ?request.code,
                reason = ?request.reason,
                "close request received"
            );
            conn.close(request.code, request.reason);
        }
    }
}
