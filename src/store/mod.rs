//! Route storage for the synchronization engine.
//!
//! Holds the authoritative hostname bindings written by the registrar
//! and the backend sets written by the scheduler reconciler, and hands
//! out consistent copies to discovery readers.

mod route_store;
mod types;

pub use route_store::RouteStore;
pub use types::{Endpoint, RouteBinding, RouteSnapshot, SyncSummary};
