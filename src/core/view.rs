// src/core/view.rs

//! Computes per-vbucket read/write replica sets and in-flight move
//! information from a pair of server lists.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::ring::Ring;

/// Ordered list of server identities for one vbucket. Position 0 is primary.
pub type ReplicaList = Vec<String>;

/// Old and new replica lists for a vbucket undergoing a move.
pub type ReplicaChange = (ReplicaList, ReplicaList);

/// Immutable snapshot of cluster membership and replica assignment.
#[derive(Debug, Clone)]
pub struct ClusterView {
    pub servers: Vec<String>,
    pub read_set: Vec<ReplicaList>,
    pub write_set: Vec<ReplicaList>,
    pub moves: HashMap<usize, ReplicaChange>,
    pub view_number: u64,
}

impl ClusterView {
    /// Builds a stable view (no transition in progress): one ring sized to
    /// `current.len()`, `read_set == write_set` with up to `replicas` entries
    /// per vbucket.
    fn build_stable(
        current: &[String],
        replicas: usize,
        vbuckets: usize,
        view_number: u64,
    ) -> Self {
        let mut ring = Ring::new(vbuckets);
        ring.update(current.len());
        let want = replicas.min(current.len());

        let mut read_set = Vec::with_capacity(vbuckets);
        for vbucket in 0..vbuckets {
            let idxs = ring.nodes_for(vbucket, want);
            let names: ReplicaList = idxs.into_iter().map(|i| current[i].clone()).collect();
            read_set.push(names);
        }
        let write_set = read_set.clone();

        Self {
            servers: current.to_vec(),
            read_set,
            write_set,
            moves: HashMap::new(),
            view_number,
        }
    }

    /// Builds a transitional view: two rings (one per server list), read and
    /// write sets equal to `dedup(current_nodes ++ new_nodes)` per vbucket,
    /// and a move map for every vbucket whose sorted replica set changed.
    fn build_transition(
        current: &[String],
        new: &[String],
        replicas: usize,
        vbuckets: usize,
        view_number: u64,
    ) -> Self {
        let merged: BTreeSet<String> = current.iter().chain(new.iter()).cloned().collect();
        let servers: Vec<String> = merged.into_iter().collect();

        let mut current_ring = Ring::new(vbuckets);
        current_ring.update(current.len());
        let mut new_ring = Ring::new(vbuckets);
        new_ring.update(new.len());

        let mut read_set = Vec::with_capacity(vbuckets);
        let mut write_set = Vec::with_capacity(vbuckets);
        let mut moves = HashMap::new();

        for vbucket in 0..vbuckets {
            let current_nodes: ReplicaList = current_ring
                .nodes_for(vbucket, replicas.min(current.len().max(1)))
                .into_iter()
                .map(|i| current[i].clone())
                .collect();
            let new_nodes: ReplicaList = new_ring
                .nodes_for(vbucket, replicas.min(new.len().max(1)))
                .into_iter()
                .map(|i| new[i].clone())
                .collect();

            let mut current_sorted = current_nodes.clone();
            current_sorted.sort();
            let mut new_sorted = new_nodes.clone();
            new_sorted.sort();
            if current_sorted != new_sorted {
                moves.insert(vbucket, (current_nodes.clone(), new_nodes.clone()));
            }

            let mut effective = Vec::with_capacity(current_nodes.len() + new_nodes.len());
            let mut seen = HashSet::new();
            for server in current_nodes.into_iter().chain(new_nodes) {
                if seen.insert(server.clone()) {
                    effective.push(server);
                }
            }

            write_set.push(effective.clone());
            read_set.push(effective);
        }

        Self {
            servers,
            read_set,
            write_set,
            moves,
            view_number,
        }
    }

    /// Computes a `ClusterView` from `current`/`new` server lists. An empty
    /// `new` list means "stable"; a non-empty one means "transition in
    /// progress".
    pub fn build(
        current: &[String],
        new: &[String],
        replicas: usize,
        vbuckets: usize,
        view_number: u64,
    ) -> Self {
        if new.is_empty() {
            Self::build_stable(current, replicas, vbuckets, view_number)
        } else {
            Self::build_transition(current, new, replicas, vbuckets, view_number)
        }
    }

    pub fn read_replicas(&self, vbucket: u16) -> &[String] {
        &self.read_set[vbucket as usize]
    }

    pub fn write_replicas(&self, vbucket: u16) -> &[String] {
        &self.write_set[vbucket as usize]
    }

    pub fn is_transitioning(&self) -> bool {
        !self.moves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("server-{i}")).collect()
    }

    #[test]
    fn stable_view_has_equal_read_and_write_sets() {
        let servers = names(3);
        let view = ClusterView::build(&servers, &[], 2, 64, 1);
        for vbucket in 0..64 {
            assert_eq!(view.read_replicas(vbucket), view.write_replicas(vbucket));
            assert_eq!(view.read_replicas(vbucket).len(), 2);
        }
        assert!(!view.is_transitioning());
    }

    #[test]
    fn stable_view_with_single_server_has_single_replica() {
        let servers = names(1);
        let view = ClusterView::build(&servers, &[], 2, 8, 1);
        for vbucket in 0..8 {
            assert_eq!(view.read_replicas(vbucket), &["server-0".to_string()]);
        }
    }

    #[test]
    fn transition_write_set_is_dedup_concat_of_current_and_new() {
        let current = names(2); // server-0, server-1
        let new = names(3); // server-0, server-1, server-2
        let view = ClusterView::build(&current, &new, 2, 64, 2);

        for vbucket in 0..64 {
            let write = view.write_replicas(vbucket);
            let mut seen = HashSet::new();
            for s in write {
                assert!(seen.insert(s.clone()), "write set must be deduplicated");
            }
            assert_eq!(view.read_replicas(vbucket), write);
        }
    }

    #[test]
    fn transition_records_moves_only_for_changed_vbuckets() {
        let current = names(2);
        let new = names(3);
        let view = ClusterView::build(&current, &new, 2, 64, 2);
        assert!(view.is_transitioning());
        for (_, (old, new_list)) in view.moves.iter() {
            let mut old_sorted = old.clone();
            old_sorted.sort();
            let mut new_sorted = new_list.clone();
            new_sorted.sort();
            assert_ne!(old_sorted, new_sorted);
        }
    }

    #[test]
    fn view_number_is_carried_through() {
        let servers = names(1);
        let view = ClusterView::build(&servers, &[], 1, 8, 42);
        assert_eq!(view.view_number, 42);
    }
}
