// src/core/resolver.rs

//! Target resolution for the topology-neutral client: given a domain name,
//! resolve it to a small number of candidate backend addresses, with a
//! blacklist so a target that just failed isn't immediately retried.

use std::collections::HashSet;
use std::net::ToSocketAddrs;
use std::sync::Mutex;

use crate::core::connection::ServerIdentity;
use crate::core::errors::{MeshKvError, Result};

/// How many distinct targets `resolve` returns per call, before blacklist
/// filtering.
const DEFAULT_TARGET_COUNT: usize = 2;

/// Resolves a domain to a bounded set of candidate backend targets and lets
/// callers blacklist a target that failed so it's skipped on the next call.
pub trait Resolver: Send + Sync {
    fn resolve(&self, domain: &str) -> Result<Vec<ServerIdentity>>;
    fn blacklist(&self, target: &ServerIdentity);
}

/// Resolves `domain:port` via the system resolver, returning up to
/// [`DEFAULT_TARGET_COUNT`] distinct, non-blacklisted addresses.
pub struct DnsResolver {
    target_count: usize,
    blacklisted: Mutex<HashSet<ServerIdentity>>,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_COUNT)
    }
}

impl DnsResolver {
    pub fn new(target_count: usize) -> Self {
        Self {
            target_count,
            blacklisted: Mutex::new(HashSet::new()),
        }
    }
}

impl Resolver for DnsResolver {
    fn resolve(&self, domain: &str) -> Result<Vec<ServerIdentity>> {
        let addrs = domain
            .to_socket_addrs()
            .map_err(|_| MeshKvError::NoConnection(domain.to_string()))?;

        let blacklisted = self.blacklisted.lock().expect("resolver mutex poisoned");
        let targets: Vec<ServerIdentity> = addrs
            .map(|addr| addr.to_string())
            .filter(|identity| !blacklisted.contains(identity))
            .take(self.target_count)
            .collect();

        if targets.is_empty() {
            return Err(MeshKvError::NoConnection(domain.to_string()));
        }

        Ok(targets)
    }

    fn blacklist(&self, target: &ServerIdentity) {
        self.blacklisted
            .lock()
            .expect("resolver mutex poisoned")
            .insert(target.clone());
    }
}
