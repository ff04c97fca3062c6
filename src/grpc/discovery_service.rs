//! gRPC Discovery implementation.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::copilot_api::discovery_server::Discovery;
use crate::copilot_api::{
    Backend, GetRoutesRequest, GetRoutesResponse, HealthRequest, HealthResponse,
    ResolveVipRequest, ResolveVipResponse, Route, WatchRoutesRequest,
};
use crate::store::{RouteSnapshot, RouteStore};

/// Messages buffered per watch stream before the sender waits.
const WATCH_BUFFER: usize = 4;

/// gRPC service serving the reconciled route table to mesh control planes.
///
/// Every response is built from a `RouteStore::snapshot` copy, so no
/// store lock is held while a response is encoded or written.
pub struct DiscoveryServiceImpl {
    store: Arc<RouteStore>,
    shutdown: watch::Receiver<bool>,
}

impl DiscoveryServiceImpl {
    /// Creates a new DiscoveryServiceImpl reading from the given store.
    ///
    /// Open watch streams end when `shutdown` changes.
    pub fn new(store: Arc<RouteStore>, shutdown: watch::Receiver<bool>) -> Self {
        Self { store, shutdown }
    }
}

/// Converts a store snapshot into its wire form.
fn to_response(snapshot: RouteSnapshot) -> GetRoutesResponse {
    let routes = snapshot
        .bindings
        .into_iter()
        .map(|binding| Route {
            hostname: binding.hostname,
            virtual_address: binding.virtual_address.to_string(),
            backends: binding
                .backends
                .into_iter()
                .map(|e| Backend {
                    address: e.address,
                    port: e.port,
                })
                .collect(),
        })
        .collect();

    GetRoutesResponse {
        version: snapshot.version,
        routes,
    }
}

#[tonic::async_trait]
impl Discovery for DiscoveryServiceImpl {
    type WatchRoutesStream = ReceiverStream<Result<GetRoutesResponse, Status>>;

    /// Returns all currently bound routes.
    async fn get_routes(
        &self,
        _request: Request<GetRoutesRequest>,
    ) -> Result<Response<GetRoutesResponse>, Status> {
        let response = to_response(self.store.snapshot());
        tracing::debug!(
            version = response.version,
            routes = response.routes.len(),
            "Serving routes"
        );
        Ok(Response::new(response))
    }

    /// Streams the full route table on connect and after every change.
    async fn watch_routes(
        &self,
        _request: Request<WatchRoutesRequest>,
    ) -> Result<Response<Self::WatchRoutesStream>, Status> {
        let store = Arc::clone(&self.store);
        let mut changes = store.subscribe();
        let mut shutdown = self.shutdown.clone();
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                changes.borrow_and_update();
                let response = to_response(store.snapshot());
                let version = response.version;

                tokio::select! {
                    sent = tx.send(Ok(response)) => {
                        if sent.is_err() {
                            break; // client disconnected
                        }
                    }
                    _ = shutdown.changed() => break,
                }
                tracing::trace!(version, "pushed route snapshot");

                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown.changed() => break,
                    _ = tx.closed() => break,
                }
            }
            tracing::debug!("route watch stream closed");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// Resolves a hostname to its virtual address.
    async fn resolve_vip(
        &self,
        request: Request<ResolveVipRequest>,
    ) -> Result<Response<ResolveVipResponse>, Status> {
        let fqdn = request.into_inner().fqdn;
        let hostname = fqdn.trim_end_matches('.');
        if hostname.trim().is_empty() {
            return Err(Status::invalid_argument("fqdn must not be empty"));
        }

        let binding = self
            .store
            .lookup_hostname(hostname)
            .ok_or_else(|| Status::not_found(format!("route doesn't exist: {}", fqdn)))?;

        Ok(Response::new(ResolveVipResponse {
            virtual_address: binding.virtual_address.to_string(),
        }))
    }

    /// Reports process liveness, independent of route state.
    async fn health(
        &self,
        _request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        tracing::trace!("discovery health check");
        Ok(Response::new(HealthResponse { healthy: true }))
    }
}
