// src/client/replica_source.rs

//! The abstraction that lets one replicated-client state machine serve both
//! the topology-aware and topology-neutral variants: given a fully
//! qualified key, produce the vbucket it maps to and the ordered replica
//! list to read from or write to.

use crate::core::connection::ServerIdentity;

/// Where a key's data lives, from one variant's point of view.
pub trait ReplicaSource: Send + Sync {
    /// The vbucket `fqkey` maps to (topology-neutral sources that don't use
    /// vbuckets at all return `0`), and the primary-first replica list to
    /// read from.
    fn read_replicas(&self, fqkey: &str) -> (u16, Vec<ServerIdentity>);

    /// The vbucket `fqkey` maps to, and the primary-first replica list to
    /// write to (primary gets the conditional write; the rest get a
    /// best-effort fan-out).
    fn write_replicas(&self, fqkey: &str) -> (u16, Vec<ServerIdentity>);

    /// Reports that `server` failed to serve a request for this source's
    /// current target set. Topology-neutral sources use this to blacklist
    /// the target for subsequent resolutions; topology-aware sources, which
    /// already know the whole ring, ignore it.
    fn report_failure(&self, server: &ServerIdentity);

    /// Tombstone lifetime (seconds) to use when writing a delete tombstone.
    fn tombstone_lifetime(&self) -> u32;
}
