//! HTTP routes for one SockJS endpoint.
//!
//! An endpoint may be installed under several prefixes; all of them share
//! its handler and session registry.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::handler::Handler;
use super::session::{Session, SessionRegistry};
use super::websocket::{self, Mode};
use super::xhr;

const GREETING: &str = "Welcome to SockJS!\n";
const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Transport tuning shared by every endpoint.
#[derive(Debug, Clone)]
pub struct SockJsOptions {
    /// Idle time after which a heartbeat frame is sent.
    pub heartbeat_delay: Duration,
    /// How long a session survives without a receiver.
    pub disconnect_delay: Duration,
    /// Whether the websocket transports are offered.
    pub websocket: bool,
}

impl Default for SockJsOptions {
    fn default() -> Self {
        Self {
            heartbeat_delay: Duration::from_secs(25),
            disconnect_delay: Duration::from_secs(5),
            websocket: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct Info {
    websocket: bool,
    cookie_needed: bool,
    origins: [&'static str; 1],
    entropy: u32,
}

/// A handler plus the state needed to serve it over SockJS transports.
pub struct Endpoint {
    handler: Arc<dyn Handler>,
    sessions: SessionRegistry,
    options: SockJsOptions,
}

impl Endpoint {
    pub fn new(handler: impl Handler, options: SockJsOptions) -> Arc<Self> {
        Arc::new(Self {
            handler: Arc::new(handler),
            sessions: SessionRegistry::new(),
            options,
        })
    }

    pub fn name(&self) -> &'static str {
        self.handler.name()
    }

    /// Expire sessions that lost their receiver.
    pub fn sweep(&self, now: Instant) -> usize {
        self.sessions.sweep(now, self.options.disconnect_delay)
    }

    /// Routes for this endpoint under `prefix`.
    pub fn router(self: &Arc<Self>, prefix: &str) -> Router {
        let mut router = Router::new()
            .route(prefix, get(greeting))
            .route(&format!("{prefix}/"), get(greeting))
            .route(&format!("{prefix}/info"), get(info))
            .route(&format!("{prefix}/:server/:session/xhr"), post(xhr_poll))
            .route(&format!("{prefix}/:server/:session/xhr_send"), post(xhr_send));

        if self.options.websocket {
            router = router
                .route(&format!("{prefix}/websocket"), get(raw_websocket))
                .route(
                    &format!("{prefix}/:server/:session/websocket"),
                    get(framed_websocket),
                );
        }

        router.with_state(Arc::clone(self))
    }

    fn new_session(&self, id: &str) -> Arc<Session> {
        Session::new(id, Arc::clone(&self.handler))
    }
}

/// Server and session ids are non-empty and dot-free.
fn valid_ids(server: &str, session: &str) -> bool {
    [server, session]
        .iter()
        .all(|segment| !segment.is_empty() && !segment.contains('.'))
}

async fn greeting() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=UTF-8")], GREETING)
}

async fn info(State(endpoint): State<Arc<Endpoint>>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, NO_CACHE)],
        Json(Info {
            websocket: endpoint.options.websocket,
            cookie_needed: false,
            origins: ["*:*"],
            entropy: rand::random(),
        }),
    )
}

async fn xhr_poll(
    State(endpoint): State<Arc<Endpoint>>,
    Path((server, session)): Path<(String, String)>,
) -> Response {
    if !valid_ids(&server, &session) {
        return StatusCode::NOT_FOUND.into_response();
    }
    xhr::poll(
        &endpoint.sessions,
        &endpoint.handler,
        &session,
        endpoint.options.heartbeat_delay,
    )
    .await
}

async fn xhr_send(
    State(endpoint): State<Arc<Endpoint>>,
    Path((server, session)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if !valid_ids(&server, &session) {
        return StatusCode::NOT_FOUND.into_response();
    }
    xhr::send(&endpoint.sessions, &session, &body)
}

async fn framed_websocket(
    State(endpoint): State<Arc<Endpoint>>,
    Path((server, session)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    if !valid_ids(&server, &session) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let session = endpoint.new_session(&session);
    let heartbeat = endpoint.options.heartbeat_delay;
    ws.on_upgrade(move |socket| websocket::serve(socket, session, Mode::Framed, heartbeat))
}

async fn raw_websocket(State(endpoint): State<Arc<Endpoint>>, ws: WebSocketUpgrade) -> Response {
    let session = endpoint.new_session(&format!("raw-{:08x}", rand::random::<u32>()));
    let heartbeat = endpoint.options.heartbeat_delay;
    ws.on_upgrade(move |socket| websocket::serve(socket, session, Mode::Raw, heartbeat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sockjs::session::tests::Recorder;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn endpoint(options: SockJsOptions) -> Arc<Endpoint> {
        Endpoint::new(Recorder::default(), options)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_valid_ids() {
        assert!(valid_ids("000", "abc"));
        assert!(!valid_ids("", "abc"));
        assert!(!valid_ids("000", "a.b"));
    }

    #[tokio::test]
    async fn test_greeting() {
        let router = endpoint(SockJsOptions::default()).router("/test/ws/echo");
        for uri in ["/test/ws/echo", "/test/ws/echo/"] {
            let (status, body) = call(&router, Method::GET, uri, "").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, GREETING);
        }
    }

    #[tokio::test]
    async fn test_info() {
        let options = SockJsOptions {
            websocket: false,
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");
        let (status, body) = call(&router, Method::GET, "/p/info", "").await;
        assert_eq!(status, StatusCode::OK);

        let info: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(info["websocket"], false);
        assert_eq!(info["cookie_needed"], false);
        assert_eq!(info["origins"][0], "*:*");
        assert!(info["entropy"].is_u64());
    }

    #[tokio::test]
    async fn test_websocket_routes_absent_when_disabled() {
        let options = SockJsOptions {
            websocket: false,
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");
        let (status, _) = call(&router, Method::GET, "/p/000/abc/websocket", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_xhr_session_flow() {
        let options = SockJsOptions {
            heartbeat_delay: Duration::from_millis(50),
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");

        let (status, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "o\n");

        let (status, _) = call(&router, Method::POST, "/p/000/s1/xhr_send", r#"["hi","there"]"#).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "a[\"hi\",\"there\"]\n");

        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "h\n");

        call(&router, Method::POST, "/p/000/s1/xhr_send", r#"["stop"]"#).await;
        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "c[3000,\"stopped\"]\n");

        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "c[3000,\"stopped\"]\n");
    }

    #[tokio::test]
    async fn test_idle_poll_after_delivery_waits_for_heartbeat() {
        let heartbeat = Duration::from_millis(300);
        let options = SockJsOptions {
            heartbeat_delay: heartbeat,
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");

        call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        call(&router, Method::POST, "/p/000/s1/xhr_send", r#"["hi"]"#).await;
        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "a[\"hi\"]\n");

        let started = Instant::now();
        let (_, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(body, "h\n");
        assert!(started.elapsed() >= heartbeat, "returned after {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_waiting_poll_wakes_on_send() {
        let options = SockJsOptions {
            heartbeat_delay: Duration::from_secs(10),
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");
        call(&router, Method::POST, "/p/000/s1/xhr", "").await;

        let poller = router.clone();
        let poll = tokio::spawn(async move { call(&poller, Method::POST, "/p/000/s1/xhr", "").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        call(&router, Method::POST, "/p/000/s1/xhr_send", r#"["wake"]"#).await;

        let (_, body) = tokio::time::timeout(Duration::from_secs(2), poll)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body, "a[\"wake\"]\n");
    }

    #[tokio::test]
    async fn test_concurrent_poll_rejected() {
        let options = SockJsOptions {
            heartbeat_delay: Duration::from_millis(300),
            ..SockJsOptions::default()
        };
        let router = endpoint(options).router("/p");
        call(&router, Method::POST, "/p/000/s1/xhr", "").await;

        let poller = router.clone();
        let first = tokio::spawn(async move { call(&poller, Method::POST, "/p/000/s1/xhr", "").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, body) = call(&router, Method::POST, "/p/000/s1/xhr", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "c[2010,\"Another connection still open\"]\n");

        let (_, body) = first.await.unwrap();
        assert_eq!(body, "h\n");
    }

    #[tokio::test]
    async fn test_xhr_send_errors() {
        let router = endpoint(SockJsOptions::default()).router("/p");

        let (status, _) = call(&router, Method::POST, "/p/000/nope/xhr_send", r#"["x"]"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(&router, Method::POST, "/p/000/s1/xhr", "").await;

        let (status, body) = call(&router, Method::POST, "/p/000/s1/xhr_send", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Payload expected.");

        let (status, body) = call(&router, Method::POST, "/p/000/s1/xhr_send", "[\"x\"").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Broken JSON encoding.");
    }

    #[tokio::test]
    async fn test_xhr_rejects_dotted_session() {
        let router = endpoint(SockJsOptions::default()).router("/p");
        let (status, _) = call(&router, Method::POST, "/p/000/a.b/xhr", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sweep_closes_idle_sessions() {
        let endpoint = endpoint(SockJsOptions::default());
        let router = endpoint.router("/p");
        call(&router, Method::POST, "/p/000/s1/xhr", "").await;

        assert_eq!(endpoint.sweep(Instant::now()), 0);
        assert_eq!(endpoint.sweep(Instant::now() + Duration::from_secs(5)), 1);

        let (status, _) = call(&router, Method::POST, "/p/000/s1/xhr_send", r#"["x"]"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
