//! gRPC Registrar implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::copilot_api::registrar_server::Registrar;
use crate::copilot_api::{
    AddRouteRequest, AddRouteResponse, RemoveRouteRequest, RemoveRouteResponse, SyncRoutesRequest,
    SyncRoutesResponse,
};
use crate::store::RouteStore;

/// gRPC service accepting route bindings from the upstream registrar.
pub struct RegistrarServiceImpl {
    store: Arc<RouteStore>,
}

impl RegistrarServiceImpl {
    /// Creates a new RegistrarServiceImpl writing into the given store.
    pub fn new(store: Arc<RouteStore>) -> Self {
        Self { store }
    }
}

fn require(field: &str, value: &str) -> Result<(), Status> {
    if value.trim().is_empty() {
        return Err(Status::invalid_argument(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[tonic::async_trait]
impl Registrar for RegistrarServiceImpl {
    /// Binds a hostname to an application and returns its virtual address.
    async fn add_route(
        &self,
        request: Request<AddRouteRequest>,
    ) -> Result<Response<AddRouteResponse>, Status> {
        let req = request.into_inner();
        require("application_id", &req.application_id)?;
        require("hostname", &req.hostname)?;

        let vip = self.store.bind(&req.application_id, &req.hostname)?;

        tracing::info!(
            application_id = %req.application_id,
            hostname = %req.hostname,
            %vip,
            "Route added"
        );

        Ok(Response::new(AddRouteResponse {
            virtual_address: vip.to_string(),
        }))
    }

    async fn remove_route(
        &self,
        request: Request<RemoveRouteRequest>,
    ) -> Result<Response<RemoveRouteResponse>, Status> {
        let req = request.into_inner();
        require("application_id", &req.application_id)?;

        let removed = self.store.unbind(&req.application_id);
        tracing::info!(application_id = %req.application_id, removed, "Route removed");

        Ok(Response::new(RemoveRouteResponse {}))
    }

    /// Replaces every binding with the given set.
    async fn sync_routes(
        &self,
        request: Request<SyncRoutesRequest>,
    ) -> Result<Response<SyncRoutesResponse>, Status> {
        let req = request.into_inner();
        let requested = req.routes.len();

        let summary = self.store.sync_bindings(
            req.routes
                .into_iter()
                .map(|r| (r.application_id, r.hostname)),
        )?;

        tracing::info!(
            requested,
            added = summary.added,
            removed = summary.removed,
            retained = summary.retained,
            "Routes synced"
        );

        Ok(Response::new(SyncRoutesResponse {
            added: summary.added,
            removed: summary.removed,
            retained: summary.retained,
        }))
    }
}
