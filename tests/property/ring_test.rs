// tests/property/ring_test.rs

use meshkv::core::ring::Ring;
use proptest::prelude::*;

proptest! {
    /// Growing a ring one node at a time and growing it directly to the
    /// same final node count must land on the same slot assignment: growth
    /// only ever depends on the current and target node counts, never on
    /// the path taken to get there.
    #[test]
    fn growth_path_does_not_affect_final_assignment(final_nodes in 1usize..12) {
        let slots = 128;

        let mut direct = Ring::new(slots);
        direct.update(final_nodes);

        let mut stepwise = Ring::new(slots);
        for n in 1..=final_nodes {
            stepwise.update(n);
        }

        for slot in 0..slots {
            prop_assert_eq!(direct.nodes_for(slot, 1), stepwise.nodes_for(slot, 1));
        }
    }

    /// `nodes_for` never returns more distinct node indices than the ring
    /// currently has nodes, and never returns fewer than requested once the
    /// ring has at least one node.
    #[test]
    fn nodes_for_respects_the_node_count(node_count in 1usize..16, replicas in 1usize..8) {
        let mut ring = Ring::new(64);
        ring.update(node_count);

        let assigned = ring.nodes_for(0, replicas);
        prop_assert_eq!(assigned.len(), replicas);
        let distinct: std::collections::HashSet<_> = assigned.iter().collect();
        prop_assert!(distinct.len() <= node_count.min(replicas));
    }

    /// The ring never shrinks: requesting fewer nodes than currently
    /// assigned is always a no-op.
    #[test]
    fn update_never_reduces_the_node_count(first in 1usize..16, second in 0usize..16) {
        let mut ring = Ring::new(64);
        ring.update(first);
        let before = ring.node_count();
        ring.update(second);
        prop_assert!(ring.node_count() >= before);
    }
}
