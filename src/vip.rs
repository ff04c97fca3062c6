//! Deterministic virtual address allocation.
//!
//! Every hostname maps to a stable address inside `127.0.0.0/8`, derived
//! from the SHA-256 digest of the hostname. The mapping is a pure function,
//! so a binding that is removed and re-created gets the same address back.
//! Distinct hostnames may collide; collisions are accepted and not tracked.

use std::net::Ipv4Addr;

use sha2::{Digest, Sha256};

/// Returns the virtual address for `hostname`.
///
/// The two low bits of the last octet are always set, so the result is
/// never `127.0.0.0` or `127.0.0.1`.
pub fn allocate(hostname: &str) -> Ipv4Addr {
    let digest = Sha256::digest(hostname.as_bytes());
    let h0 = digest[0] | 0x03;
    Ipv4Addr::new(127, digest[2], digest[1], h0)
}
