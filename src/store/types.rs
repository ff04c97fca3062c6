//! Route binding data model.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use crate::vip;

/// One running application instance, reachable at `address:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: String,
    pub port: u32,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u32) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A hostname bound to an application, with its virtual address and
/// the instances currently serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub application_id: String,
    pub hostname: String,
    /// Always `vip::allocate(hostname)`; fixed when the binding is created.
    pub virtual_address: Ipv4Addr,
    pub backends: BTreeSet<Endpoint>,
}

impl RouteBinding {
    /// Creates a binding with no backends, minting the virtual address
    /// from the hostname.
    pub(crate) fn new(application_id: String, hostname: String) -> Self {
        let virtual_address = vip::allocate(&hostname);
        Self {
            application_id,
            hostname,
            virtual_address,
            backends: BTreeSet::new(),
        }
    }
}

/// A point-in-time copy of every binding in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSnapshot {
    /// Store version the copy was taken at.
    pub version: u64,
    /// Bindings ordered by hostname.
    pub bindings: Vec<RouteBinding>,
}

/// Outcome of a full registrar sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: u32,
    pub removed: u32,
    pub retained: u32,
}
