//! XHR polling transport.
//!
//! - `POST .../xhr`: receive one frame, long-polling up to the heartbeat delay
//! - `POST .../xhr_send`: deliver a JSON array of messages

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::frame::{self, CloseFrame};
use super::handler::Handler;
use super::session::{Pending, Session, SessionRegistry, SessionState};

const JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
const PLAIN: &str = "text/plain; charset=UTF-8";

/// Detaches the receiver when the poll ends, including when the client
/// hangs up mid-poll and the request future is dropped.
struct Receiver<'a>(&'a Session);

impl Drop for Receiver<'_> {
    fn drop(&mut self) {
        self.0.detach();
    }
}

/// Answer one polling request for `session_id`.
pub async fn poll(
    sessions: &SessionRegistry,
    handler: &Arc<dyn Handler>,
    session_id: &str,
    heartbeat: Duration,
) -> Response {
    let (session, created) = sessions.get_or_create(session_id, handler);

    if created {
        let _receiver = attach(&session);
        session.open();
        return frame_response(frame::OPEN);
    }

    if matches!(session.state(), SessionState::Closing | SessionState::Closed) {
        return deliver_close(&session);
    }

    let Some(_receiver) = attach(&session) else {
        trace!(session = session_id, "Rejecting concurrent poll");
        return frame_response(&CloseFrame::another_connection().encode());
    };

    let changed = session.changed();
    match session.take_pending() {
        Pending::Messages(batch) => return frame_response(&frame::messages(&batch)),
        Pending::Close(_) => return deliver_close(&session),
        Pending::Nothing => {}
    }

    if tokio::time::timeout(heartbeat, changed).await.is_err() {
        return frame_response(frame::HEARTBEAT);
    }

    match session.take_pending() {
        Pending::Messages(batch) => frame_response(&frame::messages(&batch)),
        Pending::Close(_) => deliver_close(&session),
        Pending::Nothing => frame_response(frame::HEARTBEAT),
    }
}

/// Deliver a client payload to an existing session.
pub fn send(sessions: &SessionRegistry, session_id: &str, body: &Bytes) -> Response {
    let Some(session) = sessions.get(session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let payload = String::from_utf8_lossy(body);
    match frame::decode(&payload) {
        Ok(messages) => {
            session.dispatch(messages);
            (StatusCode::NO_CONTENT, [(header::CONTENT_TYPE, PLAIN)]).into_response()
        }
        Err(e) => {
            debug!(session = session_id, error = %e, "Rejecting xhr_send payload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, PLAIN)],
                e.to_string(),
            )
                .into_response()
        }
    }
}

fn attach(session: &Session) -> Option<Receiver<'_>> {
    session.attach().then_some(Receiver(session))
}

fn deliver_close(session: &Arc<Session>) -> Response {
    let close = session.close_frame().unwrap_or_default();
    session.mark_closed();
    frame_response(&close.encode())
}

fn frame_response(body: &str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, JAVASCRIPT)],
        frame::line(body),
    )
        .into_response()
}
