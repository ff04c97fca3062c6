//! Scheduler polling and backend reconciliation.
//!
//! The reconciler periodically asks the workload scheduler which
//! instances are running and writes the resulting backend sets into the
//! route store. The scheduler is reached through the [`InstanceSource`]
//! trait; [`GrpcInstanceSource`] is the production implementation.

mod reconciler;
mod source;

pub use reconciler::{ReconcileStats, Reconciler};
pub use source::{GrpcInstanceSource, InstanceSource};
