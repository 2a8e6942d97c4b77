//! Minimal SockJS server transport.
//!
//! Serves the parts of the SockJS protocol a client needs to reach an
//! endpoint:
//! - greeting and `/info`
//! - websocket, SockJS-framed and raw
//! - xhr polling with `xhr_send`
//!
//! Shared abstractions:
//! - `Handler`: per-endpoint application callbacks
//! - `Session` / `Connection`: message queue and lifecycle of one client
//! - `Endpoint`: a handler plus its session registry, mountable under prefixes

mod endpoint;
mod frame;
mod handler;
pub(crate) mod session;
mod websocket;
mod xhr;

pub use endpoint::{Endpoint, SockJsOptions};
pub use handler::Handler;
pub use session::Connection;
