// src/core/ring.rs

//! Consistent-hash ring over a fixed number of slots, growing incrementally
//! so that adding a node only ever takes slots away from existing nodes —
//! never reshuffles slots between two existing nodes.

use std::collections::BTreeSet;

/// Maps `slots` vbucket positions onto an incrementally growing set of node
/// indices.
#[derive(Debug, Clone)]
pub struct Ring {
    slots: usize,
    nodes: usize,
    assignment: Vec<Option<usize>>,
    node_slots: Vec<BTreeSet<usize>>,
}

impl Ring {
    /// Creates an unassigned ring of `slots` positions.
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "a ring must have at least one slot");
        Self {
            slots,
            nodes: 0,
            assignment: vec![None; slots],
            node_slots: Vec::new(),
        }
    }

    /// Number of slots in the ring.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Number of nodes currently assigned slots.
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Grows the ring's node assignment to `nodes`, never shrinking.
    ///
    /// The ring cannot shrink in place: calling `update` with a value less
    /// than or equal to the current node count is a no-op. Shrinking the
    /// cluster requires building a fresh `Ring` (see `DESIGN.md` for the
    /// documented "rebuild from zero" choice).
    pub fn update(&mut self, nodes: usize) {
        if nodes == 0 || nodes <= self.nodes {
            return;
        }

        if self.node_slots.len() < nodes {
            self.node_slots.resize(nodes, BTreeSet::new());
        }

        if self.nodes == 0 {
            for slot in 0..self.slots {
                self.assign_slot(slot, 0);
            }
            self.nodes = 1;
        }

        while self.nodes < nodes {
            let new_node = self.nodes;
            let replace_slots = self.slots / (self.nodes + 1);

            for i in 0..replace_slots {
                let mut replace_node = 0;
                for candidate in 1..self.nodes {
                    if self.node_slots[candidate].len() >= self.node_slots[replace_node].len() {
                        replace_node = candidate;
                    }
                }
                let slot = self.owned_slot(replace_node, i);
                self.assign_slot(slot, new_node);
            }

            self.nodes += 1;
        }
    }

    /// Returns the `i`-th (mod owned count) slot currently owned by `node`,
    /// iterating the node's owned slots in ascending order.
    fn owned_slot(&self, node: usize, number: usize) -> usize {
        let owned = &self.node_slots[node];
        let count = owned.len();
        assert!(count > 0, "node must own at least one slot to donate");
        let idx = number % count;
        *owned.iter().nth(idx).expect("idx within bounds")
    }

    fn assign_slot(&mut self, slot: usize, node: usize) {
        if let Some(old) = self.assignment[slot] {
            self.node_slots[old].remove(&slot);
        }
        self.assignment[slot] = Some(node);
        self.node_slots[node].insert(slot);
    }

    /// Returns `replicas` distinct node indices for `slot`, walking forward
    /// and wrapping. If the ring has fewer nodes than `replicas`, the
    /// remaining positions repeat the first node assigned to `slot`.
    pub fn nodes_for(&self, slot: usize, replicas: usize) -> Vec<usize> {
        if self.nodes == 0 {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(replicas);
        let want = replicas.min(self.nodes);
        let mut pos = slot % self.slots;

        loop {
            if let Some(node) = self.assignment[pos]
                && !result.contains(&node)
            {
                result.push(node);
            }
            if result.len() >= want {
                break;
            }
            pos = (pos + 1) % self.slots;
        }

        if let Some(first) = self.assignment[slot % self.slots] {
            while result.len() < replicas {
                result.push(first);
            }
        }

        result
    }
}
