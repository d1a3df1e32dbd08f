// src/client/topology_aware.rs

//! The topology-aware constructor: the client owns the ring and cluster
//! view directly (via a [`SharedView`] kept current by
//! [`crate::core::config_updater`]) and computes replica lists itself.

use std::sync::Arc;

use crate::client::replica_source::ReplicaSource;
use crate::core::config_updater::SharedView;
use crate::core::connection::ServerIdentity;
use crate::key::vbucket_for_key;

/// A [`ReplicaSource`] backed by a live, signal-refreshed cluster view.
pub struct TopologyAwareSource {
    view: Arc<SharedView>,
    tombstone_lifetime: u32,
}

impl TopologyAwareSource {
    pub fn new(view: Arc<SharedView>, tombstone_lifetime: u32) -> Self {
        Self {
            view,
            tombstone_lifetime,
        }
    }
}

impl ReplicaSource for TopologyAwareSource {
    fn read_replicas(&self, fqkey: &str) -> (u16, Vec<ServerIdentity>) {
        let view = self.view.current();
        let vbucket = vbucket_for_key(fqkey, view.read_set.len());
        (vbucket, view.read_replicas(vbucket).to_vec())
    }

    fn write_replicas(&self, fqkey: &str) -> (u16, Vec<ServerIdentity>) {
        let view = self.view.current();
        let vbucket = vbucket_for_key(fqkey, view.write_set.len());
        (vbucket, view.write_replicas(vbucket).to_vec())
    }

    fn report_failure(&self, _server: &ServerIdentity) {
        // The ring already knows every server; a single failed call isn't
        // grounds for removing a node from the topology. Removal happens
        // through a config reload, not per-call feedback.
    }

    fn tombstone_lifetime(&self) -> u32 {
        self.tombstone_lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::ClusterView;

    #[test]
    fn read_and_write_replicas_agree_on_vbucket_for_the_same_key() {
        let servers: Vec<String> = (0..3).map(|i| format!("server-{i}")).collect();
        let view = ClusterView::build(&servers, &[], 2, 64, 1);
        let source = TopologyAwareSource::new(Arc::new(SharedView::new(view)), 30);

        let (read_vbucket, read_replicas) = source.read_replicas("reg\u{0}\u{0}alice");
        let (write_vbucket, write_replicas) = source.write_replicas("reg\u{0}\u{0}alice");

        assert_eq!(read_vbucket, write_vbucket);
        assert_eq!(read_replicas, write_replicas);
        assert_eq!(read_replicas.len(), 2);
    }

    #[test]
    fn tombstone_lifetime_is_carried_through() {
        let view = ClusterView::build(&["server-0".to_string()], &[], 1, 8, 1);
        let source = TopologyAwareSource::new(Arc::new(SharedView::new(view)), 200);
        assert_eq!(source.tombstone_lifetime(), 200);
    }
}
