// src/client/mod.rs

//! The replicated client: one state machine (add/overwrite-tombstone,
//! replica iteration, primary-write-then-fan-out) shared by two alternative
//! constructors — [`topology_aware`], which owns the ring and cluster view
//! directly, and [`topology_neutral`], which resolves targets through an
//! external [`crate::core::resolver::Resolver`]. Neither is a subclass of
//! the other; both just build a [`replicated::ReplicatedClient`] with a
//! different [`replica_source::ReplicaSource`].

pub mod replica_source;
pub mod replicated;
pub mod topology_aware;
pub mod topology_neutral;

pub use replica_source::ReplicaSource;
pub use replicated::ReplicatedClient;
pub use topology_aware::TopologyAwareSource;
pub use topology_neutral::TopologyNeutralSource;

use std::hash::{Hash, Hasher};

/// Derives a stable worker id for the calling OS thread, used to key the
/// per-worker connection cache. Two calls from the same thread always
/// produce the same id; calls from different threads (almost always)
/// produce different ones.
pub(crate) fn current_worker_id() -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
