//! Session state shared between handlers and transports.
//!
//! A session outlives any single HTTP request: polling transports attach,
//! drain the outbox and detach again, while the websocket transport stays
//! attached for the session's whole life. Handlers only ever see the
//! [`Connection`] handle.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{info, trace};

use super::frame::{CloseFrame, DEFAULT_CLOSE_CODE, DEFAULT_CLOSE_REASON};
use super::handler::Handler;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, open frame not yet sent.
    Connecting,
    /// Open frame sent; messages flow both ways.
    Open,
    /// Close requested; close frame pending delivery.
    Closing,
    /// Close frame delivered or receiver gone.
    Closed,
}

/// What a transport should send next.
#[derive(Debug, PartialEq, Eq)]
pub enum Pending {
    Messages(Vec<String>),
    Close(CloseFrame),
    Nothing,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    outbox: VecDeque<String>,
    close_frame: Option<CloseFrame>,
    attached: bool,
    detached_at: Option<Instant>,
    close_notified: bool,
}

/// A single SockJS session.
pub struct Session {
    id: String,
    handler: Arc<dyn Handler>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Session {
    pub fn new(id: impl Into<String>, handler: Arc<dyn Handler>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            handler,
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                outbox: VecDeque::new(),
                close_frame: None,
                attached: false,
                detached_at: Some(Instant::now()),
                close_notified: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Handle passed to the endpoint's callbacks.
    pub fn connection(self: &Arc<Self>) -> Connection {
        Connection {
            session: Arc::clone(self),
        }
    }

    /// Move to `Open` and run the handler's `on_open`.
    ///
    /// Returns `false` if the session was already past `Connecting`.
    pub fn open(self: &Arc<Self>) -> bool {
        {
            let mut inner = self.lock();
            if inner.state != SessionState::Connecting {
                return false;
            }
            inner.state = SessionState::Open;
        }

        info!(endpoint = self.handler.name(), session = %self.id, "opened");
        self.handler.on_open(&self.connection());
        true
    }

    /// Deliver inbound messages to the handler, in order.
    ///
    /// Messages arriving after the handler closed the session are dropped.
    pub fn dispatch(self: &Arc<Self>, messages: Vec<String>) {
        let conn = self.connection();
        for message in messages {
            if self.state() != SessionState::Open {
                trace!(session = %self.id, "dropping message for closed session");
                break;
            }
            self.handler.on_message(&conn, &message);
        }
    }

    /// Queue an outbound message.
    pub fn write(&self, message: &str) -> bool {
        {
            let mut inner = self.lock();
            if inner.state != SessionState::Open {
                return false;
            }
            inner.outbox.push_back(message.to_string());
        }
        self.notify.notify_waiters();
        true
    }

    /// Request the session be closed with the given frame.
    pub fn close(&self, frame: CloseFrame) -> bool {
        {
            let mut inner = self.lock();
            if !matches!(inner.state, SessionState::Connecting | SessionState::Open) {
                return false;
            }
            inner.state = SessionState::Closing;
            inner.close_frame = Some(frame);
        }
        self.notify.notify_waiters();
        true
    }

    /// Take what the attached transport should send next.
    ///
    /// Queued messages drain before the close frame.
    pub fn take_pending(&self) -> Pending {
        let mut inner = self.lock();
        if !inner.outbox.is_empty() {
            return Pending::Messages(inner.outbox.drain(..).collect());
        }
        match (inner.state, &inner.close_frame) {
            (SessionState::Closing | SessionState::Closed, Some(frame)) => {
                Pending::Close(frame.clone())
            }
            _ => Pending::Nothing,
        }
    }

    /// Close frame for a session that is closing or closed.
    pub fn close_frame(&self) -> Option<CloseFrame> {
        self.lock().close_frame.clone()
    }

    /// Resolves on the next message or close queued after this call.
    ///
    /// Create it before draining with `take_pending` so a write racing the
    /// drain still wakes the waiter. Nothing queued before the call counts.
    pub fn changed(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Mark a receiver as attached. Returns `false` if one already is.
    pub fn attach(&self) -> bool {
        let mut inner = self.lock();
        if inner.attached {
            return false;
        }
        inner.attached = true;
        inner.detached_at = None;
        true
    }

    pub fn detach(&self) {
        let mut inner = self.lock();
        inner.attached = false;
        inner.detached_at = Some(Instant::now());
    }

    /// Whether nobody has been attached for at least `delay`.
    pub fn is_expired(&self, now: Instant, delay: Duration) -> bool {
        let inner = self.lock();
        match inner.detached_at {
            Some(at) if !inner.attached => now.saturating_duration_since(at) >= delay,
            _ => false,
        }
    }

    /// Move to `Closed`, running `on_close` the first time.
    pub fn mark_closed(self: &Arc<Self>) {
        {
            let mut inner = self.lock();
            inner.state = SessionState::Closed;
            if inner.close_frame.is_none() {
                inner.close_frame = Some(CloseFrame::default());
            }
            if inner.close_notified {
                return;
            }
            inner.close_notified = true;
        }
        self.handler.on_close(&self.connection());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a session, as seen by an endpoint.
#[derive(Clone)]
pub struct Connection {
    session: Arc<Session>,
}

impl Connection {
    pub fn id(&self) -> &str {
        self.session.id()
    }

    /// Send a message to the peer. Returns `false` once the session is closing.
    pub fn write(&self, message: &str) -> bool {
        self.session.write(message)
    }

    /// Close the session, defaulting to `1000 "Normal closure"`.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) -> bool {
        self.session.close(CloseFrame::new(
            code.unwrap_or(DEFAULT_CLOSE_CODE),
            reason.unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string()),
        ))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.session.id)
            .finish()
    }
}

/// Sessions of one endpoint, keyed by the client-chosen session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.lock().get(id).cloned()
    }

    /// Look up a session, creating it if absent. The flag is `true` when created.
    pub fn get_or_create(&self, id: &str, handler: &Arc<dyn Handler>) -> (Arc<Session>, bool) {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get(id) {
            return (Arc::clone(session), false);
        }
        let session = Session::new(id, Arc::clone(handler));
        sessions.insert(id.to_string(), Arc::clone(&session));
        (session, true)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop sessions that have had no receiver for `delay`, closing them.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep(&self, now: Instant, delay: Duration) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.lock();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.is_expired(now, delay))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.mark_closed();
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
