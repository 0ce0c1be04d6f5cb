//! A compact dense adjacency list for one node at one layer.
//!
//! `EdgeList` is deliberately unordered: `remove` swaps the victim with the
//! last element and truncates, which is O(1) amortized instead of the O(len)
//! a stable remove would cost, at the price of not preserving insertion
//! order (the algorithm never relies on it, see spec §4.1).

use serde::{Deserialize, Serialize};

/// A node's out- or in-adjacency at a single layer.
///
/// Pre-sized to `max_edges + 1` for its layer so the first overflow push
/// (the one that triggers pruning in [`crate::connector`]) doesn't force a
/// reallocation mid-mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeList {
    ids: Vec<u32>,
}

impl EdgeList {
    /// Creates an empty edge list pre-sized for `max_edges_for_layer + 1`
    /// neighbors, per spec §4.1.
    #[must_use]
    pub fn with_capacity(max_edges_for_layer: usize) -> Self {
        Self {
            ids: Vec::with_capacity(max_edges_for_layer + 1),
        }
    }

    /// Number of neighbors currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if no neighbors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Appends `id`, amortized O(1). Does not check for duplicates: callers
    /// (the [`crate::connector`] module) are responsible for only appending
    /// ids that are not already present, per invariant 2 of spec §3.
    pub fn push(&mut self, id: u32) {
        self.ids.push(id);
    }

    /// Removes `id` if present, by swapping it with the last element and
    /// truncating. O(len). Returns whether `id` was found.
    pub fn remove(&mut self, id: u32) -> bool {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.swap_remove(pos);
            true
        } else {
            false
        }
    }

    /// Linear membership test.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Borrows the underlying ids. No ordering is guaranteed.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.ids
    }

    /// Consumes self, returning the underlying ids.
    #[must_use]
    pub fn into_vec(self) -> Vec<u32> {
        self.ids
    }

    /// Builds an `EdgeList` directly from an id vector (used when replacing
    /// the full neighbor set after pruning).
    #[must_use]
    pub fn from_vec(ids: Vec<u32>) -> Self {
        Self { ids }
    }
}
