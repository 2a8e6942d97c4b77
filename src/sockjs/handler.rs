//! Application callbacks for a SockJS endpoint.

use tracing::info;

use super::session::Connection;

/// Per-endpoint connection callbacks.
///
/// Callbacks run synchronously on the transport task that received the
/// event, so they must not block. Replies are queued through the
/// [`Connection`] and flushed by whichever transport is attached.
pub trait Handler: Send + Sync + 'static {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Called once when the session opens.
    fn on_open(&self, _conn: &Connection) {}

    /// Called for every inbound message while the session is open.
    fn on_message(&self, conn: &Connection, message: &str);

    /// Called exactly once when the session is closed.
    fn on_close(&self, conn: &Connection) {
        info!(endpoint = self.name(), session = conn.id(), "closed");
    }
}
