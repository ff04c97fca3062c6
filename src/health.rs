//! HTTP health server for process supervisors.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.
//! Readiness flips once the first scheduler reconciliation succeeds.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared flag recording whether backend state has been reconciled at
/// least once.
#[derive(Debug, Default)]
pub struct Readiness {
    ready: AtomicBool,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

fn respond(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Handles health check requests.
///
/// Returns 200 "ok" for `/healthz`, 200 or 503 for `/readyz` depending on
/// readiness, and 404 for all other paths.
pub async fn health_handler<B>(
    req: Request<B>,
    readiness: Arc<Readiness>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" => respond(StatusCode::OK, "ok"),
        "/readyz" if readiness.is_ready() => respond(StatusCode::OK, "ok"),
        "/readyz" => respond(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => respond(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

/// Serves health requests on `listener` until `shutdown` fires.
pub async fn serve_health(
    listener: TcpListener,
    readiness: Arc<Readiness>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.changed() => {
                tracing::debug!("health server shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let readiness = Arc::clone(&readiness);

        tokio::spawn(async move {
            let service = service_fn(move |req| health_handler(req, Arc::clone(&readiness)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "health connection error");
            }
        });
    }
}

/// Binds `addr` and serves health requests until `shutdown` fires.
pub async fn start_health_server(
    addr: SocketAddr,
    readiness: Arc<Readiness>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "health server listening");
    serve_health(listener, readiness, shutdown).await
}
