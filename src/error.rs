//! Error types for the route repository, the scheduler client and
//! configuration loading.

use std::path::PathBuf;
use std::time::Duration;

use tonic::Status;

/// Errors returned by [`crate::store::RouteStore`] mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("hostname {hostname} is already bound to application {existing}")]
    HostnameConflict { hostname: String, existing: String },
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(_) => Status::invalid_argument(err.to_string()),
            StoreError::HostnameConflict { .. } => Status::already_exists(err.to_string()),
        }
    }
}

/// Errors from querying the workload scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler query timed out after {0:?}")]
    Timeout(Duration),

    #[error("scheduler rpc failed: {0}")]
    Rpc(#[from] Status),
}

/// Errors from loading the process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
