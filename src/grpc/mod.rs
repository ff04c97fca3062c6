//! gRPC server implementations.
//!
//! Provides the Registrar service, which receives hostname bindings from
//! the upstream routing API, and the Discovery service, which serves the
//! reconciled route table to mesh control planes.

mod discovery_service;
mod registrar_service;

pub use discovery_service::DiscoveryServiceImpl;
pub use registrar_service::RegistrarServiceImpl;
