//! Websocket transports.
//!
//! Two flavors share one pump:
//! - `Framed`: SockJS framing over websocket (`o`, `h`, `a[...]`, `c[...]`)
//! - `Raw`: one websocket text frame per message, no framing

use axum::extract::ws::{CloseFrame as WsCloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, trace};

use super::frame::{self, CloseFrame, FrameError};
use super::session::{Pending, Session};

type Sink = SplitSink<WebSocket, Message>;

/// Control frame payload limit (125) minus the two-byte close code.
const MAX_CLOSE_REASON: usize = 123;

/// Websocket wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Framed,
    Raw,
}

enum Flow {
    Continue,
    Closed,
}

/// Drive `session` over `socket` until either side closes.
pub async fn serve(socket: WebSocket, session: Arc<Session>, mode: Mode, heartbeat: Duration) {
    if let Err(e) = pump(socket, &session, mode, heartbeat).await {
        debug!(session = session.id(), error = %e, "Websocket error");
    }
    session.mark_closed();
}

async fn pump(
    socket: WebSocket,
    session: &Arc<Session>,
    mode: Mode,
    heartbeat: Duration,
) -> Result<(), axum::Error> {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = heartbeat_ticker(heartbeat);

    if mode == Mode::Framed {
        sink.send(Message::Text(frame::OPEN.to_string())).await?;
    }
    session.attach();
    session.open();

    loop {
        let changed = session.changed();
        if let Flow::Closed = flush(&mut sink, session, mode).await? {
            return Ok(());
        }

        tokio::select! {
            _ = changed => {}
            _ = ticker.tick(), if mode == Mode::Framed => {
                trace!(session = session.id(), "heartbeat");
                sink.send(Message::Text(frame::HEARTBEAT.to_string())).await?;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match mode {
                    Mode::Raw => session.dispatch(vec![text]),
                    Mode::Framed => match frame::decode(&text) {
                        Ok(messages) => session.dispatch(messages),
                        Err(FrameError::Empty) => {}
                        Err(e) => {
                            debug!(session = session.id(), error = %e, "Dropping websocket");
                            return Ok(());
                        }
                    },
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
        }
    }
}

/// Send everything the session has queued.
async fn flush(sink: &mut Sink, session: &Session, mode: Mode) -> Result<Flow, axum::Error> {
    loop {
        match session.take_pending() {
            Pending::Messages(batch) => match mode {
                Mode::Framed => sink.send(Message::Text(frame::messages(&batch))).await?,
                Mode::Raw => {
                    for message in batch {
                        sink.send(Message::Text(message)).await?;
                    }
                }
            },
            Pending::Close(close) => {
                if mode == Mode::Framed {
                    sink.send(Message::Text(close.encode())).await?;
                }
                sink.send(Message::Close(Some(ws_close_frame(&close)))).await?;
                return Ok(Flow::Closed);
            }
            Pending::Nothing => return Ok(Flow::Continue),
        }
    }
}

fn heartbeat_ticker(period: Duration) -> Interval {
    interval_at(Instant::now() + period, period)
}

/// Map a SockJS close frame onto a websocket close frame.
///
/// Websocket peers reject codes outside 1000 and 3000-4999 coming from an
/// application, so anything else goes out as 1000. The reason is cut to fit
/// a control frame.
fn ws_close_frame(close: &CloseFrame) -> WsCloseFrame<'static> {
    let code = match close.code {
        1000 | 3000..=4999 => close.code,
        _ => frame::DEFAULT_CLOSE_CODE,
    };
    WsCloseFrame {
        code,
        reason: truncate_reason(&close.reason).to_string().into(),
    }
}

/// Longest prefix of `reason` within `MAX_CLOSE_REASON` bytes, on a char boundary.
fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let end = (0..=MAX_CLOSE_REASON)
        .rev()
        .find(|&i| reason.is_char_boundary(i))
        .unwrap_or(0);
    &reason[..end]
}
