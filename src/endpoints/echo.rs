//! Echo endpoint: every message is written back verbatim.

use tracing::info;

use crate::sockjs::{Connection, Handler};

pub struct Echo;

impl Handler for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn on_message(&self, conn: &Connection, message: &str) {
        info!(endpoint = "echo", session = conn.id(), payload = message, "received");
        conn.write(message);
    }
}
