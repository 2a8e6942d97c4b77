//! Ping endpoint.
//!
//! ```text
//! Request:  ping      Response: pong
//! Request:  ping3     Response: pong, pong, pong
//! Request:  ping0     Response: (nothing)
//! ```

use tracing::info;

use super::parse_int_prefix;
use crate::sockjs::{Connection, Handler};

const PONG: &str = "pong";

/// Number of pongs requested by a ping message.
///
/// The first `ping` is removed and the remainder read as a count. An empty
/// remainder means one pong; a remainder with no leading number, or a
/// negative one, means none. The count is not capped: every pong is queued
/// synchronously on the calling transport task.
pub fn pong_count(message: &str) -> u64 {
    let rest = message.replacen("ping", "", 1);
    if rest.is_empty() {
        return 1;
    }
    parse_int_prefix(&rest).map_or(0, |n| n.max(0).unsigned_abs())
}

pub struct Ping;

impl Handler for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn on_message(&self, conn: &Connection, message: &str) {
        for _ in 0..pong_count(message) {
            if !conn.write(PONG) {
                break;
            }
            info!(endpoint = "ping", session = conn.id(), "pong");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_count() {
        assert_eq!(pong_count("ping"), 1);
        assert_eq!(pong_count(""), 1);
    }

    #[test]
    fn test_explicit_count() {
        assert_eq!(pong_count("ping3"), 3);
        assert_eq!(pong_count("ping 2"), 2);
        assert_eq!(pong_count("ping0"), 0);
        assert_eq!(pong_count("7"), 7);
    }

    #[test]
    fn test_only_first_ping_removed() {
        assert_eq!(pong_count("pingping"), 0);
        assert_eq!(pong_count("2ping"), 2);
    }

    #[test]
    fn test_count_not_capped() {
        assert_eq!(pong_count("ping100000000"), 100_000_000);
    }

    #[test]
    fn test_unparseable_count() {
        assert_eq!(pong_count("pingx"), 0);
        assert_eq!(pong_count("ping-4"), 0);
        assert_eq!(pong_count("hello"), 0);
    }
}
