// tests/integration/topology_test.rs

use std::io::Write;
use std::sync::Arc;

use meshkv::client::replica_source::ReplicaSource;
use meshkv::client::topology_aware::TopologyAwareSource;
use meshkv::core::config_reader::ConfigFileReader;
use meshkv::core::config_updater::SharedView;
use meshkv::core::view::ClusterView;
use meshkv::key::{fully_qualified_key, vbucket_for_key};

#[test]
fn a_config_file_drives_a_cluster_view_with_matching_replica_counts() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "servers=10.0.0.1:11211,10.0.0.2:11211,10.0.0.3:11211").unwrap();
    writeln!(file, "tombstone_lifetime=60").unwrap();

    let reader = ConfigFileReader::new(file.path());
    let config = reader.read_config().expect("valid config");
    assert_eq!(config.servers.len(), 3);

    let view = ClusterView::build(&config.servers, &config.new_servers, 2, 128, 1);
    let source = TopologyAwareSource::new(Arc::new(SharedView::new(view)), config.tombstone_lifetime as u32);

    let fqkey = fully_qualified_key("registrations", "alice");
    let (vbucket, replicas) = source.read_replicas(&fqkey);
    assert_eq!(vbucket, vbucket_for_key(&fqkey, 128));
    assert_eq!(replicas.len(), 2);
    assert!(replicas.iter().all(|r| config.servers.contains(r)));
}

#[test]
fn a_growing_cluster_keeps_every_key_reachable() {
    let servers: Vec<String> = (0..4).map(|i| format!("10.0.0.{i}:11211")).collect();
    let view = ClusterView::build(&servers, &[], 2, 128, 1);

    for i in 0..64 {
        let fqkey = fully_qualified_key("registrations", &format!("user-{i}"));
        let vbucket = vbucket_for_key(&fqkey, 128);
        assert_eq!(view.read_replicas(vbucket).len(), 2);
    }
}

#[test]
fn a_transitioning_cluster_reports_moves_for_every_rebalanced_vbucket() {
    let current: Vec<String> = (0..2).map(|i| format!("10.0.0.{i}:11211")).collect();
    let new: Vec<String> = (0..3).map(|i| format!("10.0.0.{i}:11211")).collect();
    let view = ClusterView::build(&current, &new, 2, 128, 2);

    assert!(view.is_transitioning());
    assert!(!view.moves.is_empty());
    for vbucket in 0..128u16 {
        // every vbucket's write set is reachable through at least one of the
        // servers known to the view, moving or not.
        assert!(
            view.write_replicas(vbucket)
                .iter()
                .all(|s| view.servers.contains(s))
        );
    }
}
