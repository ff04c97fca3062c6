//! Mutual TLS material for the gRPC server and the scheduler client.
//!
//! Certificates are read from PEM files named in the configuration and
//! handed to tonic unchanged; rotation is left to the process supervisor.

use std::path::Path;

use anyhow::Context;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

use crate::config::{ClientTlsFiles, ServerTlsFiles};

fn read_pem(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

/// Server identity plus the CA that client certificates must chain to.
pub fn server_tls_config(files: &ServerTlsFiles) -> anyhow::Result<ServerTlsConfig> {
    let identity = Identity::from_pem(read_pem(&files.cert)?, read_pem(&files.key)?);
    let client_ca = Certificate::from_pem(read_pem(&files.client_ca)?);

    Ok(ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(client_ca))
}

/// Client identity and trusted CA for the scheduler connection.
pub fn client_tls_config(files: &ClientTlsFiles) -> anyhow::Result<ClientTlsConfig> {
    let identity = Identity::from_pem(read_pem(&files.client_cert)?, read_pem(&files.client_key)?);
    let ca = Certificate::from_pem(read_pem(&files.ca_cert)?);

    let mut config = ClientTlsConfig::new().ca_certificate(ca).identity(identity);
    if let Some(name) = &files.server_name {
        config = config.domain_name(name.clone());
    }
    Ok(config)
}
