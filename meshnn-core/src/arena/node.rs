//! The node record stored at a fixed id in the arena.

use super::edge_list::EdgeList;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Dense integer identifying a node. Ids are reused after removal (§3).
pub type NodeId = u32;

/// A node's per-layer state: a lock-free-readable snapshot of its
/// adjacency, guarded for writers by a dedicated mutex (spec §4.7.2's
/// "edge-list lock", distinct from the coarser [`crate::region_lock`]
/// neighborhood lock).
struct LayerEdges {
    /// Published snapshot. Readers call `.load()`, no lock, no blocking,
    /// tolerates being read concurrently with a writer publishing a new
    /// snapshot (spec §5's read/write discipline).
    snapshot: ArcSwap<EdgeList>,
    /// Serializes read-modify-write sequences by structural writers.
    write_lock: Mutex<()>,
}

impl LayerEdges {
    fn new(max_edges: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(EdgeList::with_capacity(max_edges)),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Arc<EdgeList> {
        self.snapshot.load_full()
    }

    /// Runs `f` over a private copy of the current list under the write
    /// lock, then atomically publishes the result. `f` returns the ids to
    /// publish (it may be the mutated copy itself).
    fn mutate(&self, f: impl FnOnce(EdgeList) -> EdgeList) {
        let _guard = self.write_lock.lock();
        let current = (*self.snapshot.load_full()).clone();
        let next = f(current);
        self.snapshot.store(Arc::new(next));
    }
}

/// A single node in the graph.
///
/// `out_edges[l]` / `in_edges[l]` hold at most `max_layer` entries (index
/// `0..=max_layer`). `in_edges` is `None` when the index was built with
/// `allow_removals = false` (spec §6).
pub struct Node {
    id: NodeId,
    max_layer: usize,
    out_edges: Vec<LayerEdges>,
    in_edges: Option<Vec<LayerEdges>>,
}

impl Node {
    /// Creates a node with empty, appropriately pre-sized edge lists for
    /// every layer `0..=max_layer`.
    pub(crate) fn new(
        id: NodeId,
        max_layer: usize,
        max_edges: impl Fn(usize) -> usize,
        track_in_edges: bool,
    ) -> Self {
        let out_edges = (0..=max_layer).map(|l| LayerEdges::new(max_edges(l))).collect();
        let in_edges = track_in_edges
            .then(|| (0..=max_layer).map(|l| LayerEdges::new(max_edges(l))).collect());
        Self { id, max_layer, out_edges, in_edges }
    }

    /// This node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The highest layer this node participates in.
    #[must_use]
    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Lock-free snapshot read of `out_edges[layer]`. Returns an empty list
    /// if `layer > max_layer` rather than panicking, so racing readers that
    /// observe a stale `max_layer` never crash (spec §5).
    #[must_use]
    pub fn out_edges(&self, layer: usize) -> Arc<EdgeList> {
        self.out_edges
            .get(layer)
            .map(LayerEdges::load)
            .unwrap_or_default()
    }

    /// Lock-free snapshot read of `in_edges[layer]`. Returns an empty list
    /// if in-edges are not tracked or `layer` is out of range.
    #[must_use]
    pub fn in_edges(&self, layer: usize) -> Arc<EdgeList> {
        self.in_edges
            .as_ref()
            .and_then(|v| v.get(layer))
            .map(LayerEdges::load)
            .unwrap_or_default()
    }

    /// Whether this node tracks reverse adjacency at all.
    #[must_use]
    pub fn tracks_in_edges(&self) -> bool {
        self.in_edges.is_some()
    }

    pub(crate) fn mutate_out(&self, layer: usize, f: impl FnOnce(EdgeList) -> EdgeList) {
        if let Some(le) = self.out_edges.get(layer) {
            le.mutate(f);
        }
    }

    pub(crate) fn mutate_in(&self, layer: usize, f: impl FnOnce(EdgeList) -> EdgeList) {
        if let Some(v) = &self.in_edges {
            if let Some(le) = v.get(layer) {
                le.mutate(f);
            }
        }
    }

    pub(crate) fn set_out(&self, layer: usize, edges: EdgeList) {
        self.mutate_out(layer, |_| edges);
    }

    pub(crate) fn set_in(&self, layer: usize, edges: EdgeList) {
        self.mutate_in(layer, |_| edges);
    }
}

trait ArcSwapLoadDefault {
    fn unwrap_or_default(self) -> Arc<EdgeList>;
}

impl ArcSwapLoadDefault for Option<Arc<EdgeList>> {
    fn unwrap_or_default(self) -> Arc<EdgeList> {
        self.unwrap_or_else(|| Arc::new(EdgeList::default()))
    }
}
