//! Periodic reconciliation of backend sets against the scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::health::Readiness;
use crate::store::{Endpoint, RouteStore};

use super::InstanceSource;

/// Counters from one reconciliation cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Applications reported by the scheduler.
    pub applications: u32,
    /// Bindings whose backend set changed.
    pub updated: u32,
    /// Bindings emptied because the scheduler no longer reports them.
    pub emptied: u32,
    /// Endpoints reported by the scheduler.
    pub endpoints: u32,
}

/// Polls the scheduler on a fixed interval and writes backend sets into
/// the route store.
///
/// Bindings are never removed here. An application missing from the
/// scheduler response only has its backend set emptied.
pub struct Reconciler {
    store: Arc<RouteStore>,
    source: Arc<dyn InstanceSource>,
    interval: Duration,
    timeout: Duration,
    readiness: Option<Arc<Readiness>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<RouteStore>,
        source: Arc<dyn InstanceSource>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            interval,
            timeout,
            readiness: None,
        }
    }

    /// Marks `readiness` once a cycle has succeeded.
    pub fn with_readiness(mut self, readiness: Arc<Readiness>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Runs a single cycle.
    ///
    /// On error the store is left untouched.
    pub async fn reconcile_once(&self) -> Result<ReconcileStats, SchedulerError> {
        let instances = tokio::time::timeout(self.timeout, self.source.list_running_instances())
            .await
            .map_err(|_| SchedulerError::Timeout(self.timeout))??;

        let stats = self.apply(instances);
        if let Some(readiness) = &self.readiness {
            readiness.mark_ready();
        }

        debug!(
            applications = stats.applications,
            updated = stats.updated,
            emptied = stats.emptied,
            endpoints = stats.endpoints,
            version = self.store.version(),
            "reconcile cycle complete"
        );
        Ok(stats)
    }

    fn apply(&self, instances: HashMap<String, Vec<Endpoint>>) -> ReconcileStats {
        let mut stats = ReconcileStats {
            applications: instances.len() as u32,
            ..Default::default()
        };

        for application_id in self.store.application_ids() {
            if !instances.contains_key(&application_id)
                && self.store.sync_backends(&application_id, std::iter::empty())
            {
                stats.emptied += 1;
            }
        }

        for (application_id, endpoints) in instances {
            stats.endpoints += endpoints.len() as u32;
            if self.store.sync_backends(&application_id, endpoints) {
                stats.updated += 1;
            }
        }

        stats
    }

    /// Runs cycles until `shutdown` changes.
    ///
    /// Cycles never overlap: a tick that fires while a cycle is still
    /// running is skipped. Failed cycles are logged and retried on the
    /// next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "scheduler reconciler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; startup has already run a cycle.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.reconcile_once() => {
                            if let Err(e) = result {
                                warn!(error = %e, "reconcile cycle failed, retrying next interval");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("scheduler reconciler shutting down");
    }
}
