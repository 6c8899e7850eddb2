//! HTTP transport
//!
//! axum runs on its own thread with a current-thread tokio runtime. It does
//! not answer requests itself: every request is forwarded as an [`Inbound`]
//! message to the thread owning the models, which replies through a oneshot
//! channel. This keeps model handles and callbacks on the backend's thread.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, error, info};

use avon_core::codec::CONTENT_TYPE;

use crate::error::ConfigError;
use crate::router::Reply;

/// A request waiting to be answered by the backend thread
pub struct Inbound {
    pub method: Method,
    pub path: String,
    pub body: Bytes,
    reply: oneshot::Sender<Reply>,
}

impl Inbound {
    pub fn new(method: Method, path: impl Into<String>, body: Bytes) -> (Self, oneshot::Receiver<Reply>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                method,
                path: path.into(),
                body,
                reply,
            },
            rx,
        )
    }

    /// Send the reply back to the waiting connection
    pub fn respond(self, reply: Reply) {
        if self.reply.send(reply).is_err() {
            debug!(path = %self.path, "Client went away before reply");
        }
    }
}

/// Build the axum router that forwards every request to `requests`.
///
/// Every response, including the favicon and refusals, carries `server_header`.
pub fn build_router(
    requests: mpsc::Sender<Inbound>,
    server_header: HeaderValue,
    root_dir: &Path,
) -> Router {
    Router::new()
        .route_service("/favicon.ico", ServeFile::new(root_dir.join("favicon.ico")))
        .fallback(forward)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            server_header,
        ))
        .with_state(requests)
}

async fn forward(
    State(requests): State<mpsc::Sender<Inbound>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let (inbound, rx) = Inbound::new(method, uri.path(), body);

    if requests.send(inbound).await.is_err() {
        return unavailable();
    }
    match rx.await {
        Ok(reply) => reply_response(reply),
        Err(_) => unavailable(),
    }
}

/// Turn a router reply into an HTTP response
pub fn reply_response(reply: Reply) -> Response {
    match reply {
        Ok(Some(body)) => (StatusCode::OK, axum::Json(body)).into_response(),
        Ok(None) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)]).into_response(),
        Err(e) => e.into_response(),
    }
}

fn unavailable() -> Response {
    let body = serde_json::json!({
        "error": "server is shutting down",
        "status": StatusCode::SERVICE_UNAVAILABLE.as_u16(),
    });
    (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response()
}

/// The running HTTP listener
pub struct Transport {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Transport {
    /// Bind `addr` and start serving `app` on a background thread
    pub fn start(addr: &str, app: Router) -> Result<Self, ConfigError> {
        let listener = std::net::TcpListener::bind(addr).map_err(|source| ConfigError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("avon-http".to_string())
            .spawn(move || serve(listener, app, shutdown_rx))?;

        info!(address = %local_addr, protocol = "HTTP", "Started web server");

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Address actually bound (useful when port 0 was requested)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the server thread to exit
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Web server thread panicked");
            }
            info!(address = %self.local_addr, "Stopped web server");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn serve(listener: std::net::TcpListener, app: Router, shutdown: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to build web server runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "Failed to register listener");
                return;
            }
        };
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Web server failed");
        }
    });
}
