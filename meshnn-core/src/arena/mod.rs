//! The node/label arena: dense, growable, id-reusing storage for the graph.
//!
//! `nodes[0..length]` and `labels[0..length]` are parallel, per spec §3's
//! arena state. `capacity` doubles on overflow; vacated ids are recycled
//! from a free-id queue before the arena extends `length`. Removing a node
//! clears its label and enqueues its id but leaves the `Node` record
//! addressable, so a reader that already holds the id can still observe a
//! (possibly stale) adjacency without racing a deallocation.

pub mod edge_list;
pub mod node;

pub use edge_list::EdgeList;
pub use node::{Node, NodeId};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Outcome of [`Arena::add_item`]'s layer sampling: either the assigned
/// layer, or a veto (spec §4.3 step 1, only reachable when
/// `zero_layer_guaranteed = false`).
pub(crate) enum LayerDraw {
    Assigned(usize),
    Vetoed,
}

/// Growable arena of nodes and their labels.
pub struct Arena<L> {
    nodes: RwLock<Vec<Arc<Node>>>,
    labels: RwLock<Vec<Option<L>>>,
    capacity: AtomicUsize,
    length: AtomicUsize,
    count: AtomicUsize,
    free_ids: Mutex<VecDeque<NodeId>>,
    /// Serializes arena growth / id allocation (spec §5's "arena writers").
    index_lock: Mutex<()>,
    entry_point: AtomicI64,
    /// Spec §5's "single seeded source under a lock": layer sampling is
    /// off the hot edge-read path, so a plain mutex around a `StdRng` is
    /// simpler than threading a lock-free generator through, and keeps
    /// `random_seed` meaningfully reproducible across threads.
    rng: Mutex<StdRng>,
    mult_l: f64,
    zero_layer_guaranteed: bool,
}

/// Notified whenever the arena doubles capacity, so the visited-set pool and
/// the region locker's ownership table can extend before any writer
/// observes the new capacity (spec §4.3, §5).
pub trait ReallocationObserver: Send + Sync {
    /// Called with the new capacity immediately after the arena has grown.
    fn on_reallocation(&self, new_capacity: usize);
}

impl<L> Arena<L> {
    /// Creates an empty arena with the given initial capacity hint
    /// (`collection_size`, default 65536).
    #[must_use]
    pub fn new(initial_capacity: usize, mult_l: f64, zero_layer_guaranteed: bool, random_seed: i64) -> Self {
        let cap = initial_capacity.max(1);
        let rng = if random_seed < 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(random_seed as u64)
        };
        Self {
            nodes: RwLock::new(Vec::with_capacity(cap)),
            labels: RwLock::new(Vec::with_capacity(cap)),
            capacity: AtomicUsize::new(cap),
            length: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            free_ids: Mutex::new(VecDeque::new()),
            index_lock: Mutex::new(()),
            entry_point: AtomicI64::new(-1),
            rng: Mutex::new(rng),
            mult_l,
            zero_layer_guaranteed,
        }
    }

    /// Number of live nodes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Current allocated capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// The node holding the current entry point, or `None` if empty.
    #[must_use]
    pub fn entry_point(&self) -> Option<NodeId> {
        let v = self.entry_point.load(Ordering::Acquire);
        (v >= 0).then_some(v as NodeId)
    }

    pub(crate) fn set_entry_point(&self, id: Option<NodeId>) {
        self.entry_point
            .store(id.map_or(-1, i64::from), Ordering::Release);
    }

    /// Samples `⌊-ln(U(0,1]) · mL⌋`, per spec §4.3 step 1. Returns `None`
    /// when the configuration vetoes the insert.
    pub(crate) fn sample_layer(&self) -> LayerDraw {
        // `gen_range` over `(0.0, 1.0]` isn't directly available, so sample
        // the open-below interval and flip it to `(0, 1]`: `U(0,1]` never
        // lands on exactly `0.0`, which would make `-ln(U)` diverge.
        let uniform: f64 = 1.0 - self.rng.lock().gen::<f64>();
        let mut layer = (-uniform.ln() * self.mult_l).floor() as i64;
        if !self.zero_layer_guaranteed {
            layer -= 1;
        }
        if layer < 0 {
            LayerDraw::Vetoed
        } else {
            LayerDraw::Assigned(layer as usize)
        }
    }

    /// Returns a live node's `Arc`, or `None` if `id` is out of range. The
    /// node record may still be returned for a just-removed id (spec §4.3);
    /// callers must check [`Arena::label`] for liveness.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(id as usize).cloned()
    }

    /// Returns a clone of the label at `id`, or `None` if the id is unused
    /// or was removed.
    #[must_use]
    pub fn label(&self, id: NodeId) -> Option<L>
    where
        L: Clone,
    {
        self.labels.read().get(id as usize).and_then(Clone::clone)
    }

    /// True iff `id` currently names a live node.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool
    where
        L: Clone,
    {
        self.labels
            .read()
            .get(id as usize)
            .is_some_and(Option::is_some)
    }

    /// Allocates a fresh or reused id, wires up an empty `Node`, and stores
    /// `label`. Returns `None` if the layer draw vetoed the insert (the
    /// caller, [`crate::Index::add`], interprets this as "skip this
    /// insert"). Fires `observer.on_reallocation` synchronously before
    /// returning whenever capacity doubled, so it happens-before any caller
    /// can observe the new capacity (spec §4.3 step 2).
    pub fn add_item(
        &self,
        label: L,
        max_edges: impl Fn(usize) -> usize,
        track_in_edges: bool,
        observer: &dyn ReallocationObserver,
    ) -> Option<NodeId> {
        let layer = match self.sample_layer() {
            LayerDraw::Vetoed => return None,
            LayerDraw::Assigned(l) => l,
        };

        let _guard = self.index_lock.lock();

        let id = if let Some(reused) = self.free_ids.lock().pop_front() {
            reused
        } else {
            let id = self.length.fetch_add(1, Ordering::AcqRel) as NodeId;
            let cap = self.capacity.load(Ordering::Acquire);
            if (id as usize) >= cap {
                let new_cap = (cap * 2).max(1);
                self.capacity.store(new_cap, Ordering::Release);
                tracing::debug!(old_capacity = cap, new_capacity = new_cap, "arena reallocation");
                observer.on_reallocation(new_cap);
            }
            id
        };

        let node = Arc::new(Node::new(id, layer, &max_edges, track_in_edges));
        {
            let mut nodes = self.nodes.write();
            let mut labels = self.labels.write();
            let idx = id as usize;
            if idx >= nodes.len() {
                nodes.resize_with(idx + 1, || Arc::new(Node::new(0, 0, &max_edges, false)));
                labels.resize_with(idx + 1, || None);
            }
            nodes[idx] = node;
            labels[idx] = Some(label);
        }

        self.count.fetch_add(1, Ordering::AcqRel);
        Some(id)
    }

    /// All currently-live node ids, in arbitrary order. Off the query hot
    /// path, used by [`crate::Index::info`] and snapshotting.
    #[must_use]
    pub fn live_ids(&self) -> Vec<NodeId> {
        self.labels
            .read()
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.is_some().then_some(i as NodeId))
            .collect()
    }

    /// Overwrites the stored label at `id` in place, leaving adjacency
    /// untouched (spec §4.7.4's `update`). A no-op if `id` is out of range.
    pub fn set_label(&self, id: NodeId, label: L) {
        if let Some(slot) = self.labels.write().get_mut(id as usize) {
            *slot = Some(label);
        }
    }

    /// Clears `id`'s label and enqueues it for reuse. The `Node` record is
    /// left intact (spec §4.3). Caller must already hold the region lock
    /// for `(id, 0)` so the id cannot be reused concurrently mid-removal.
    pub fn remove_item(&self, id: NodeId) {
        self.labels.write()[id as usize] = None;
        self.free_ids.lock().push_back(id);
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Flattens the whole arena into plain, serde-friendly parts for
    /// [`crate::persistence`]. Every `Vec` here is indexed by `NodeId`, slot
    /// for slot, including vacated ids (their label is `None`).
    pub(crate) fn snapshot_parts(&self) -> ArenaParts<L>
    where
        L: Clone,
    {
        let nodes = self.nodes.read();
        let labels = self.labels.read().clone();
        let len = labels.len();

        let mut max_layers = Vec::with_capacity(len);
        let mut out_edges = Vec::with_capacity(len);
        let mut in_edges = Vec::with_capacity(len);
        for n in nodes.iter() {
            let ml = n.max_layer();
            max_layers.push(ml);
            out_edges.push((0..=ml).map(|l| n.out_edges(l).as_slice().to_vec()).collect());
            in_edges.push(
                n.tracks_in_edges()
                    .then(|| (0..=ml).map(|l| n.in_edges(l).as_slice().to_vec()).collect()),
            );
        }

        ArenaParts {
            capacity: self.capacity(),
            entry_point: self.entry_point(),
            labels,
            max_layers,
            out_edges,
            in_edges,
            free_ids: self.free_ids.lock().iter().copied().collect(),
        }
    }

    /// Rebuilds an arena from a prior [`Arena::snapshot_parts`] (spec
    /// §6.2). `track_in_edges` and `max_edges` must match the configuration
    /// the snapshot was taken under; [`crate::persistence`] derives both
    /// from the restored [`IndexParams`].
    pub(crate) fn restore(
        mult_l: f64,
        zero_layer_guaranteed: bool,
        random_seed: i64,
        track_in_edges: bool,
        max_edges: impl Fn(usize) -> usize,
        parts: ArenaParts<L>,
    ) -> Self {
        let len = parts.labels.len();
        let arena = Self::new(parts.capacity.max(len).max(1), mult_l, zero_layer_guaranteed, random_seed);

        let mut nodes = Vec::with_capacity(len);
        let mut live_count = 0usize;
        for i in 0..len {
            let ml = parts.max_layers[i];
            let node = Node::new(i as NodeId, ml, &max_edges, track_in_edges);
            for l in 0..=ml {
                node.set_out(l, EdgeList::from_vec(parts.out_edges[i][l].clone()));
                if let Some(ins) = &parts.in_edges[i] {
                    node.set_in(l, EdgeList::from_vec(ins[l].clone()));
                }
            }
            nodes.push(Arc::new(node));
            if parts.labels[i].is_some() {
                live_count += 1;
            }
        }

        *arena.nodes.write() = nodes;
        *arena.labels.write() = parts.labels;
        arena.capacity.store(parts.capacity.max(len).max(1), Ordering::Release);
        arena.length.store(len, Ordering::Release);
        arena.count.store(live_count, Ordering::Release);
        *arena.free_ids.lock() = parts.free_ids.into_iter().collect();
        arena.set_entry_point(parts.entry_point);
        arena
    }
}

/// Plain-data decomposition of an [`Arena`], suitable for bincode
/// serialization. Produced by [`Arena::snapshot_parts`], consumed by
/// [`Arena::restore`].
pub(crate) struct ArenaParts<L> {
    pub capacity: usize,
    pub entry_point: Option<NodeId>,
    pub labels: Vec<Option<L>>,
    pub max_layers: Vec<usize>,
    pub out_edges: Vec<Vec<Vec<u32>>>,
    pub in_edges: Vec<Option<Vec<Vec<u32>>>>,
    pub free_ids: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopObserver;
    impl ReallocationObserver for NoopObserver {
        fn on_reallocation(&self, _new_capacity: usize) {}
    }

    #[test]
    fn add_then_remove_then_reuse() {
        let arena: Arena<u32> = Arena::new(4, 1.0 / (16f64).ln(), true, 7);
        let id0 = arena.add_item(10, |_| 16, true, &NoopObserver).unwrap();
        let id1 = arena.add_item(20, |_| 16, true, &NoopObserver).unwrap();
        assert_eq!(arena.count(), 2);
        arena.remove_item(id0);
        assert_eq!(arena.count(), 1);
        assert!(!arena.is_live(id0));
        let id2 = arena.add_item(30, |_| 16, true, &NoopObserver).unwrap();
        assert_eq!(id2, id0, "freed id should be reused before extending length");
        assert_ne!(id1, id2);
    }

    #[test]
    fn capacity_doubles_and_fires_observer() {
        use std::sync::atomic::AtomicUsize as AU;
        struct Counter(AU);
        impl ReallocationObserver for Counter {
            fn on_reallocation(&self, _new_capacity: usize) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let arena: Arena<u32> = Arena::new(2, 1.0 / (16f64).ln(), true, 1);
        let counter = Counter(AU::new(0));
        for i in 0..5 {
            arena.add_item(i, |_| 16, false, &counter).unwrap();
        }
        assert!(counter.0.load(Ordering::SeqCst) >= 1);
        assert!(arena.capacity() >= 5);
    }

    #[test]
    fn entry_point_sentinel_round_trips() {
        let arena: Arena<u32> = Arena::new(4, 1.0, true, 1);
        assert_eq!(arena.entry_point(), None);
        arena.set_entry_point(Some(3));
        assert_eq!(arena.entry_point(), Some(3));
        arena.set_entry_point(None);
        assert_eq!(arena.entry_point(), None);
    }
}
