// src/client/topology_neutral.rs

//! The topology-neutral constructor: replica placement is delegated to an
//! external [`Resolver`] (domain name → a couple of candidate targets), and
//! this client never learns or owns a ring. Since there's no vbucket
//! concept without a ring, every key maps to vbucket `0`.

use crate::client::replica_source::ReplicaSource;
use crate::core::connection::ServerIdentity;
use crate::core::resolver::Resolver;

/// A [`ReplicaSource`] backed by a [`Resolver`] rather than an owned ring.
pub struct TopologyNeutralSource<R: Resolver> {
    target_domain: String,
    resolver: R,
    tombstone_lifetime: u32,
}

impl<R: Resolver> TopologyNeutralSource<R> {
    pub fn new(target_domain: impl Into<String>, resolver: R, tombstone_lifetime: u32) -> Self {
        Self {
            target_domain: target_domain.into(),
            resolver,
            tombstone_lifetime,
        }
    }

    fn resolve(&self) -> Vec<ServerIdentity> {
        self.resolver.resolve(&self.target_domain).unwrap_or_default()
    }
}

impl<R: Resolver> ReplicaSource for TopologyNeutralSource<R> {
    fn read_replicas(&self, _fqkey: &str) -> (u16, Vec<ServerIdentity>) {
        (0, self.resolve())
    }

    fn write_replicas(&self, _fqkey: &str) -> (u16, Vec<ServerIdentity>) {
        (0, self.resolve())
    }

    fn report_failure(&self, server: &ServerIdentity) {
        self.resolver.blacklist(server);
    }

    fn tombstone_lifetime(&self) -> u32 {
        self.tombstone_lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FixedResolver {
        targets: Vec<ServerIdentity>,
        blacklisted: Mutex<HashSet<ServerIdentity>>,
    }

    impl Resolver for FixedResolver {
        fn resolve(&self, _domain: &str) -> crate::core::errors::Result<Vec<ServerIdentity>> {
            let blacklisted = self.blacklisted.lock().unwrap();
            Ok(self
                .targets
                .iter()
                .filter(|t| !blacklisted.contains(*t))
                .cloned()
                .collect())
        }

        fn blacklist(&self, target: &ServerIdentity) {
            self.blacklisted.lock().unwrap().insert(target.clone());
        }
    }

    #[test]
    fn every_key_maps_to_vbucket_zero() {
        let source = TopologyNeutralSource::new(
            "astaire.example.com:11311",
            FixedResolver {
                targets: vec!["10.0.0.1:11311".to_string(), "10.0.0.2:11311".to_string()],
                blacklisted: Mutex::new(HashSet::new()),
            },
            30,
        );

        let (vbucket, replicas) = source.read_replicas("reg\u{0}\u{0}alice");
        assert_eq!(vbucket, 0);
        assert_eq!(replicas.len(), 2);
    }

    #[test]
    fn report_failure_blacklists_the_target_for_future_resolutions() {
        let source = TopologyNeutralSource::new(
            "astaire.example.com:11311",
            FixedResolver {
                targets: vec!["10.0.0.1:11311".to_string(), "10.0.0.2:11311".to_string()],
                blacklisted: Mutex::new(HashSet::new()),
            },
            30,
        );

        source.report_failure(&"10.0.0.1:11311".to_string());
        let (_, replicas) = source.read_replicas("reg\u{0}\u{0}alice");
        assert_eq!(replicas, vec!["10.0.0.2:11311".to_string()]);
    }
}
