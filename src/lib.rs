//! Route state synchronization between a workload scheduler and a
//! service-mesh control plane.
//!
//! The registrar binds hostnames to applications, the scheduler
//! reconciler keeps each binding's backend instances current, and the
//! discovery service serves the resulting `hostname -> virtual address ->
//! backends` table to mesh control planes.
//!
//! ```text
//! registrar ──AddRoute──▶ RouteStore ◀──sync_backends── Reconciler ◀── scheduler
//!                             │
//!                         snapshot()
//!                             ▼
//!                     Discovery (GetRoutes / WatchRoutes)
//! ```

pub mod config;
pub mod error;
mod gen;
pub mod grpc;
pub mod health;
pub mod scheduler;
pub mod store;
pub mod tls;
pub mod vip;

// Re-export generated types for convenience
pub use gen::copilot::scheduler::v1 as scheduler_api;
pub use gen::copilot::v1 as copilot_api;
