//! copilot-sync.toml configuration.
//!
//! ```toml
//! listen_address = "0.0.0.0:9000"
//! health_address = "127.0.0.1:9001"
//! log_format = "json"
//!
//! [tls]
//! cert = "/var/vcap/jobs/copilot/config/certs/server.crt"
//! key = "/var/vcap/jobs/copilot/config/certs/server.key"
//! client_ca = "/var/vcap/jobs/copilot/config/certs/client_ca.crt"
//!
//! [scheduler]
//! address = "https://bbs.service.cf.internal:8889"
//! poll_interval_ms = 30000
//! query_timeout_ms = 10000
//!
//! [scheduler.tls]
//! ca_cert = "/var/vcap/jobs/copilot/config/certs/bbs_ca.crt"
//! client_cert = "/var/vcap/jobs/copilot/config/certs/bbs_client.crt"
//! client_key = "/var/vcap/jobs/copilot/config/certs/bbs_client.key"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address of the registrar and discovery gRPC server.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Address of the plain HTTP health server.
    #[serde(default = "default_health_address")]
    pub health_address: SocketAddr,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Server identity and client CA; plaintext when absent.
    pub tls: Option<ServerTlsFiles>,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerTlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub client_ca: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler gRPC endpoint, `http://` or `https://`.
    pub address: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    pub tls: Option<ClientTlsFiles>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientTlsFiles {
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Overrides the name checked against the scheduler certificate.
    pub server_name: Option<String>,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_health_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9001))
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses and validates a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;

        if !(scheduler.address.starts_with("http://") || scheduler.address.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.address must be an http:// or https:// url, got {:?}",
                scheduler.address
            )));
        }
        if scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.poll_interval_ms must be positive".into(),
            ));
        }
        if scheduler.query_timeout_ms == 0 || scheduler.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler timeouts must be positive".into(),
            ));
        }
        if scheduler.query_timeout_ms >= scheduler.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "scheduler.query_timeout_ms must be shorter than poll_interval_ms".into(),
            ));
        }
        if self.listen_address == self.health_address {
            return Err(ConfigError::Invalid(
                "listen_address and health_address must differ".into(),
            ));
        }

        Ok(())
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
