// deref.rs — Per-block memo of address computations
//
// Within one basic block, repeated index expressions with the same text
// (`a[i][j]` read twice) share a single address node. The memo is cleared
// whenever lowering enters a new block, and is swapped out while call
// arguments are lowered so that argument addresses stay local to the call.
//
// Preconditions: keys are the canonical text of an index expression.
// Postconditions: `get` after `save` in the same block returns the saved node.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;

use crate::graph::NodeId;

#[derive(Debug, Default)]
pub struct DerefTracker {
    current: HashMap<String, NodeId>,
}

impl DerefTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every address computed so far; called on block entry.
    pub fn reset(&mut self) {
        self.current.clear();
    }

    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.current.get(key).copied()
    }

    pub fn save(&mut self, key: String, node: NodeId) {
        self.current.insert(key, node);
    }

    /// Park the current memo and start from an empty one.
    pub fn suspend(&mut self) -> HashMap<String, NodeId> {
        std::mem::take(&mut self.current)
    }

    /// Bring back a memo parked by `suspend`.
    pub fn restore(&mut self, saved: HashMap<String, NodeId>) {
        self.current = saved;
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
