//! HTTP server hosting the fixture endpoints.
//!
//! One listener serves every endpoint, each mounted under its prefix.
//! A background task expires polling sessions whose receiver went away.

use axum::Router;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::endpoints::{CloseOnRequest, Echo, Ping};
use crate::sockjs::Endpoint;

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    config: Config,
    endpoints: Vec<Arc<Endpoint>>,
    routes: Vec<(&'static str, Arc<Endpoint>)>,
}

impl Server {
    /// Create a new server instance with the fixture endpoints installed
    pub fn new(config: Config) -> Self {
        let options = config.sockjs_options();
        let close = Endpoint::new(CloseOnRequest, options.clone());
        let echo = Endpoint::new(Echo, options.clone());
        let ping = Endpoint::new(Ping, options);

        let routes = vec![
            ("/test/ws/close", Arc::clone(&close)),
            ("/test/ws/echo", Arc::clone(&echo)),
            ("/example/ws/echo", Arc::clone(&echo)),
            ("/test/ws/ping", Arc::clone(&ping)),
        ];

        Server {
            config,
            endpoints: vec![close, echo, ping],
            routes,
        }
    }

    /// Router with every endpoint mounted under its prefixes
    pub fn router(&self) -> Router {
        self.routes
            .iter()
            .fold(Router::new(), |router, (prefix, endpoint)| {
                debug!(prefix, endpoint = endpoint.name(), "Installing endpoint");
                router.merge(endpoint.router(prefix))
            })
            .layer(CorsLayer::very_permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until ctrl-c
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = bind_listener(&self.config.listen).await?;
        info!(address = %listener.local_addr()?, "Server listening");

        for (prefix, endpoint) in &self.routes {
            info!(prefix, endpoint = endpoint.name(), "Endpoint ready");
        }

        self.serve(listener, shutdown_signal()).await?;
        info!("Server stopped");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = tokio::spawn(sweep_task(
            self.endpoints.clone(),
            self.config.sockjs_options().disconnect_delay,
        ));

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        result
    }
}

/// Bind a listener with SO_REUSEADDR so quick restarts don't hit TIME_WAIT
pub async fn bind_listener(listen: &str) -> io::Result<TcpListener> {
    let addr = tokio::net::lookup_host(listen).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address found for {listen}"),
        )
    })?;

    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Background task to expire sessions without a receiver
async fn sweep_task(endpoints: Vec<Arc<Endpoint>>, disconnect_delay: Duration) {
    let mut interval = tokio::time::interval(disconnect_delay.max(Duration::from_secs(1)));

    loop {
        interval.tick().await;
        let now = Instant::now();
        for endpoint in &endpoints {
            let count = endpoint.sweep(now);
            if count > 0 {
                debug!(endpoint = endpoint.name(), count, "Expired sessions");
            }
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
