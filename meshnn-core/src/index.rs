//! The public façade (spec §4.8): the one type most callers touch, tying
//! together the arena, region locker, navigator, heuristic, and connector
//! behind `add`/`remove`/`update`/`knn`/`range`.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::Mutex;

use crate::arena::{Arena, NodeId};
use crate::config::IndexParams;
use crate::connector::Connector;
use crate::distance::Scalar;
use crate::error::{Error, Result};
use crate::heuristic::{Heuristic, RelativeNeighborhood};
use crate::navigator::{self, Filter};
use crate::region_lock::RegionLocker;
use crate::visited::VisitedSetPool;

/// A concurrent, in-memory, multi-layer approximate nearest-neighbor index.
///
/// `L` is the stored label (commonly `Vec<f32>`, but opaque to the index,
/// see [`crate::distance`]); `D` is the distance type a configured distance
/// function returns.
pub struct Index<L, D: Scalar> {
    arena: Arena<L>,
    locker: RegionLocker,
    entry_point_mutex: Mutex<()>,
    params: IndexParams,
    // `ef_search`, `ef_construction`, and `max_edges` are spec §6's
    // "runtime-mutable" parameters: they govern beam width and degree caps
    // for *future* operations only, so a relaxed atomic overlay on top of
    // the otherwise-immutable `params` snapshot is enough, no operation
    // needs to observe a torn read, only some consistent value. The other
    // fields of `params` (`allow_removals`, `zero_layer_guaranteed`,
    // `random_seed`, `distribution_rate`, `collection_size`) are fixed at
    // construction: each is baked into the arena's shape or its in-edge
    // tracking the moment the first node is added, and flipping them live
    // would desynchronize already-stored structure from the new setting.
    ef_search: AtomicUsize,
    ef_construction: AtomicUsize,
    max_edges: AtomicUsize,
    distance: Box<dyn Fn(&L, &L) -> D + Send + Sync>,
    heuristic: Box<dyn Heuristic<D> + Send + Sync>,
    visited_pool: VisitedSetPool,
}

/// Per-layer structural statistics returned by [`Index::info`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LayerStats {
    /// Number of live nodes present at this layer.
    pub node_count: usize,
    /// Sum of out-degrees across those nodes (divide by `node_count` for
    /// the mean).
    pub total_out_degree: usize,
    /// The largest out-degree observed at this layer.
    pub max_out_degree: usize,
    /// Sum of in-degrees across those nodes. Always `0` when the index was
    /// built with `allow_removals = false` (in-edges aren't tracked); spec
    /// §3 invariant P2 only claims `sum(out) == sum(in)` when they are.
    pub total_in_degree: usize,
    /// The largest in-degree observed at this layer.
    pub max_in_degree: usize,
}

impl LayerStats {
    /// Mean out-degree at this layer, or `0.0` if the layer is empty.
    #[must_use]
    pub fn avg_out_degree(&self) -> f64 {
        if self.node_count == 0 {
            0.0
        } else {
            self.total_out_degree as f64 / self.node_count as f64
        }
    }

    /// Mean in-degree at this layer, or `0.0` if the layer is empty.
    #[must_use]
    pub fn avg_in_degree(&self) -> f64 {
        if self.node_count == 0 {
            0.0
        } else {
            self.total_in_degree as f64 / self.node_count as f64
        }
    }
}

/// A snapshot of the index's structural shape, for diagnostics and tests
/// (spec §4.8, §8's recall scenarios check this alongside query results).
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// Number of live elements.
    pub len: usize,
    /// Current arena capacity.
    pub capacity: usize,
    /// The current top layer (0 if the index is empty or single-layer).
    pub top_layer: usize,
    /// The current entry point, if any.
    pub entry_point: Option<NodeId>,
    /// Per-layer statistics, indexed `0..=top_layer`.
    pub per_layer: Vec<LayerStats>,
}

impl<L: Clone + Send + Sync + 'static, D: Scalar> Index<L, D> {
    /// Builds an index with the default [`RelativeNeighborhood`] heuristic.
    pub fn new(params: IndexParams, distance: impl Fn(&L, &L) -> D + Send + Sync + 'static) -> Self {
        Self::with_heuristic(params, distance, RelativeNeighborhood)
    }

    /// Builds an index with a caller-supplied neighbor-selection heuristic
    /// (spec §4.6's plugin point).
    pub fn with_heuristic(
        params: IndexParams,
        distance: impl Fn(&L, &L) -> D + Send + Sync + 'static,
        heuristic: impl Heuristic<D> + 'static,
    ) -> Self {
        let arena = Arena::new(
            params.collection_size,
            params.distribution_rate,
            params.zero_layer_guaranteed,
            params.random_seed,
        );
        let visited_pool = VisitedSetPool::new(params.collection_size);
        Self {
            arena,
            locker: RegionLocker::new(),
            entry_point_mutex: Mutex::new(()),
            ef_search: AtomicUsize::new(params.ef_search),
            ef_construction: AtomicUsize::new(params.ef_construction),
            max_edges: AtomicUsize::new(params.max_edges),
            params,
            distance: Box::new(distance),
            heuristic: Box::new(heuristic),
            visited_pool,
        }
    }

    pub(crate) fn arena(&self) -> &Arena<L> {
        &self.arena
    }

    /// Reassembles an index from a restored arena (spec §6.2's
    /// deserialization path, see [`crate::persistence`]). The distance
    /// function and heuristic are not part of the snapshot and must be
    /// supplied fresh, exactly as at the original [`Index::new`] call.
    pub(crate) fn from_restored(
        params: IndexParams,
        arena: Arena<L>,
        distance: impl Fn(&L, &L) -> D + Send + Sync + 'static,
        heuristic: impl Heuristic<D> + 'static,
    ) -> Self {
        let visited_pool = VisitedSetPool::new(arena.capacity());
        Self {
            arena,
            locker: RegionLocker::new(),
            entry_point_mutex: Mutex::new(()),
            ef_search: AtomicUsize::new(params.ef_search),
            ef_construction: AtomicUsize::new(params.ef_construction),
            max_edges: AtomicUsize::new(params.max_edges),
            params,
            distance: Box::new(distance),
            heuristic: Box::new(heuristic),
            visited_pool,
        }
    }

    fn connector(&self) -> Connector<'_, L, D> {
        Connector {
            arena: &self.arena,
            locker: &self.locker,
            entry_point_mutex: &self.entry_point_mutex,
            ef_construction: self.ef_construction.load(AtomicOrdering::Relaxed),
            max_edges: self.max_edges.load(AtomicOrdering::Relaxed),
            distance: self.distance.as_ref(),
            heuristic: self.heuristic.as_ref(),
            visited_pool: &self.visited_pool,
        }
    }

    /// The parameters this index was built with. `ef_search`,
    /// `ef_construction`, and `max_edges` reflect the values at construction
    /// time, not subsequent [`Index::set_ef_search`]-style overrides; call
    /// those accessors directly for the live value.
    #[must_use]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Current beam width used by [`Index::knn`]/[`Index::range`] and their
    /// filtered/multi-layer variants.
    #[must_use]
    pub fn ef_search(&self) -> usize {
        self.ef_search.load(AtomicOrdering::Relaxed)
    }

    /// Overrides the query-time beam width for every search after this call
    /// returns. Takes effect immediately; in-flight searches keep whatever
    /// value they already read.
    pub fn set_ef_search(&self, ef_search: usize) {
        self.ef_search.store(ef_search, AtomicOrdering::Relaxed);
    }

    /// Current beam width used while wiring a newly inserted or updated
    /// node's edges.
    #[must_use]
    pub fn ef_construction(&self) -> usize {
        self.ef_construction.load(AtomicOrdering::Relaxed)
    }

    /// Overrides the insert-time beam width for every `add`/`update` after
    /// this call returns.
    pub fn set_ef_construction(&self, ef_construction: usize) {
        self.ef_construction.store(ef_construction, AtomicOrdering::Relaxed);
    }

    /// Current out-degree cap (`M`) for layers ≥ 1; layer 0 allows twice
    /// this.
    #[must_use]
    pub fn max_edges(&self) -> usize {
        self.max_edges.load(AtomicOrdering::Relaxed)
    }

    /// Overrides the out-degree cap for every `add`/`update`/re-prune after
    /// this call returns. Does not retroactively prune edges already wired
    /// under a looser cap, nor grow ones wired under a tighter one.
    pub fn set_max_edges(&self, max_edges: usize) {
        self.max_edges.store(max_edges, AtomicOrdering::Relaxed);
    }

    /// Number of live elements currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.count()
    }

    /// True if the index holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `label`, sampling its layer and wiring its edges (spec
    /// §4.7.1). Returns `None` if the layer draw vetoed the insert, only
    /// reachable with `zero_layer_guaranteed = false`, in which case the
    /// label is not stored at all and the caller should treat this as a
    /// deliberately-skipped insert, not an error.
    pub fn add(&self, label: L) -> Option<NodeId> {
        let m = self.max_edges.load(AtomicOrdering::Relaxed);
        let max_edges_for_layer = |l: usize| if l == 0 { m * 2 } else { m };
        let id = self
            .arena
            .add_item(label, max_edges_for_layer, self.params.allow_removals, &self.visited_pool)?;
        self.connector().connect_new_node(id);
        Some(id)
    }

    /// Inserts every label in `labels`. Runs across a rayon thread pool when
    /// the `parallel` feature is enabled (the default); a `None` entry in
    /// the result marks a layer-sampling veto for that position, not a
    /// failure (spec §8 scenario 2).
    #[cfg(feature = "parallel")]
    pub fn add_batch(&self, labels: Vec<L>) -> Vec<Option<NodeId>>
    where
        L: Sync,
        D: Sync,
    {
        use rayon::prelude::*;
        labels.into_par_iter().map(|l| self.add(l)).collect()
    }

    /// Inserts every label in `labels`, sequentially.
    #[cfg(not(feature = "parallel"))]
    pub fn add_batch(&self, labels: Vec<L>) -> Vec<Option<NodeId>> {
        labels.into_iter().map(|l| self.add(l)).collect()
    }

    /// Removes `id` and repairs the neighborhoods that pointed at it (spec
    /// §4.7.3).
    ///
    /// # Errors
    ///
    /// [`Error::RemovalNotSupported`] if this index was built with
    /// `allow_removals = false`; [`Error::InvalidArgument`] if `id` does not
    /// currently name a live node.
    pub fn remove(&self, id: NodeId) -> Result<()> {
        if !self.params.allow_removals {
            return Err(Error::RemovalNotSupported);
        }
        if !self.arena.is_live(id) {
            return Err(Error::InvalidArgument(format!("node {id} is not live")));
        }
        self.connector().remove_node_connections(id);
        Ok(())
    }

    /// Removes every id in `ids`. Ids that are no longer live are silently
    /// skipped (batched deletes are idempotent by design); a configuration
    /// that disallows removals still rejects the whole call up front.
    ///
    /// # Errors
    ///
    /// [`Error::RemovalNotSupported`] if this index was built with
    /// `allow_removals = false`.
    pub fn remove_batch(&self, ids: &[NodeId]) -> Result<()> {
        if !self.params.allow_removals {
            return Err(Error::RemovalNotSupported);
        }
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            ids.par_iter().for_each(|&id| {
                if self.arena.is_live(id) {
                    self.connector().remove_node_connections(id);
                }
            });
        }
        #[cfg(not(feature = "parallel"))]
        {
            for &id in ids {
                if self.arena.is_live(id) {
                    self.connector().remove_node_connections(id);
                }
            }
        }
        Ok(())
    }

    /// Replaces the labels at `indexes` with `new_labels` in place,
    /// selectively rewiring only the neighborhoods the change actually
    /// invalidates (spec §4.7.4).
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] if the two slices differ in length.
    pub fn update(&self, indexes: &[NodeId], new_labels: &[L]) -> Result<()> {
        self.connector().update(indexes, new_labels)
    }

    /// Returns up to `k` nearest neighbors of `query`, ascending by
    /// distance.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `k == 0`.
    pub fn knn(&self, query: &L, k: usize) -> Result<Vec<(NodeId, D)>> {
        self.knn_filtered(query, k, None)
    }

    /// As [`Index::knn`], but only ids passing `filter` may appear in the
    /// result (spec §4.5, filtered-out candidates are still traversed).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `k == 0`.
    pub fn knn_filtered(
        &self,
        query: &L,
        k: usize,
        filter: Option<&Filter<'_>>,
    ) -> Result<Vec<(NodeId, D)>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".into()));
        }
        let Some(entry) = self.arena.entry_point() else { return Ok(Vec::new()) };
        let top_layer = self.arena.node(entry).map_or(0, |n| n.max_layer());
        let delta = |nid: NodeId| -> D {
            self.arena.label(nid).map_or(D::MAX, |l| (self.distance)(query, &l))
        };
        let node_at = |nid: NodeId| self.arena.node(nid);

        let seed = navigator::find_entry_point(entry, top_layer, 0, &delta, &node_at, filter);
        let ef = self.ef_search.load(AtomicOrdering::Relaxed).max(k);
        let mut visited = self.visited_pool.checkout();
        let mut results = navigator::search_layer(&[seed], 0, ef, &delta, &node_at, filter, &mut visited);
        results.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(Ordering::Equal));
        results.truncate(k);
        Ok(results.into_iter().map(|c| (c.id, c.dist)).collect())
    }

    /// Returns every id within `radius` of `query`, ascending by distance.
    pub fn range(&self, query: &L, radius: D) -> Result<Vec<(NodeId, D)>> {
        self.range_filtered(query, radius, None)
    }

    /// As [`Index::range`], with a result filter.
    pub fn range_filtered(
        &self,
        query: &L,
        radius: D,
        filter: Option<&Filter<'_>>,
    ) -> Result<Vec<(NodeId, D)>> {
        let Some(entry) = self.arena.entry_point() else { return Ok(Vec::new()) };
        let top_layer = self.arena.node(entry).map_or(0, |n| n.max_layer());
        let delta = |nid: NodeId| -> D {
            self.arena.label(nid).map_or(D::MAX, |l| (self.distance)(query, &l))
        };
        let node_at = |nid: NodeId| self.arena.node(nid);

        let seed = navigator::find_entry_point(entry, top_layer, 0, &delta, &node_at, filter);
        let mut visited = self.visited_pool.checkout();
        let mut results =
            navigator::range_search(&[seed], 0, radius, &delta, &node_at, filter, &mut visited);
        results.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(Ordering::Equal));
        Ok(results.into_iter().map(|c| (c.id, c.dist)).collect())
    }

    /// Returns up to `k` neighbors at every layer in `[min_layer, max_layer]`
    /// (clamped to the graph's actual top layer), each layer's beam seeded by
    /// the previous layer's closest result: a diagnostic view into how the
    /// hierarchy narrows a search, rather than a faster `knn` (spec §4.8).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `k == 0` or `min_layer > max_layer`.
    pub fn multi_layer_knn(
        &self,
        query: &L,
        k: usize,
        min_layer: usize,
        max_layer: usize,
    ) -> Result<Vec<Vec<(NodeId, D)>>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".into()));
        }
        if min_layer > max_layer {
            return Err(Error::InvalidArgument(format!(
                "min_layer ({min_layer}) must be <= max_layer ({max_layer})"
            )));
        }
        let Some(entry) = self.arena.entry_point() else { return Ok(Vec::new()) };
        let top_layer = self.arena.node(entry).map_or(0, |n| n.max_layer());
        let upper = max_layer.min(top_layer);
        if min_layer > upper {
            return Ok(Vec::new());
        }
        let delta = |nid: NodeId| -> D {
            self.arena.label(nid).map_or(D::MAX, |l| (self.distance)(query, &l))
        };
        let node_at = |nid: NodeId| self.arena.node(nid);

        let mut seed = navigator::find_entry_point(entry, top_layer, upper, &delta, &node_at, None);

        let mut per_layer = Vec::with_capacity(upper - min_layer + 1);
        for l in (min_layer..=upper).rev() {
            let mut visited = self.visited_pool.checkout();
            let mut results = navigator::search_layer(
                &[seed],
                l,
                self.ef_search.load(AtomicOrdering::Relaxed).max(k),
                &delta,
                &node_at,
                None,
                &mut visited,
            );
            results.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(Ordering::Equal));
            if let Some(best) = results.first() {
                seed = best.id;
            }
            results.truncate(k);
            per_layer.push(results.into_iter().map(|c| (c.id, c.dist)).collect());
        }
        per_layer.reverse();
        Ok(per_layer)
    }

    /// Structural diagnostics: live count, capacity, and per-layer degree
    /// statistics (spec §4.8, exercised by the §8 recall scenarios).
    #[must_use]
    pub fn info(&self) -> IndexInfo {
        let live = self.arena.live_ids();
        let top_layer = self
            .arena
            .entry_point()
            .and_then(|e| self.arena.node(e))
            .map_or(0, |n| n.max_layer());
        let mut per_layer: Vec<LayerStats> = vec![LayerStats::default(); top_layer + 1];

        for id in live {
            if let Some(node) = self.arena.node(id) {
                for (l, stat) in per_layer.iter_mut().enumerate().take(node.max_layer() + 1) {
                    let deg_out = node.out_edges(l).len();
                    let deg_in = node.in_edges(l).len();
                    stat.node_count += 1;
                    stat.total_out_degree += deg_out;
                    stat.max_out_degree = stat.max_out_degree.max(deg_out);
                    stat.total_in_degree += deg_in;
                    stat.max_in_degree = stat.max_in_degree.max(deg_in);
                }
            }
        }

        IndexInfo {
            len: self.arena.count(),
            capacity: self.arena.capacity(),
            top_layer,
            entry_point: self.arena.entry_point(),
            per_layer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;

    fn vec_index() -> Index<Vec<f32>, f32> {
        Index::new(IndexParams::default().with_ef_construction(32), |a: &Vec<f32>, b: &Vec<f32>| {
            DistanceMetric::SquaredEuclidean.distance(a, b)
        })
    }

    #[test]
    fn empty_index_returns_empty_results() {
        let idx = vec_index();
        assert!(idx.is_empty());
        let res = idx.knn(&vec![0.0, 0.0], 5).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn knn_rejects_zero_k() {
        let idx = vec_index();
        assert!(idx.knn(&vec![0.0], 3).is_ok());
        assert!(matches!(idx.knn(&vec![0.0], 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn insert_then_find_self_as_nearest() {
        let idx = vec_index();
        let mut ids = Vec::new();
        for i in 0..50 {
            let v = vec![i as f32, (i * 2) as f32];
            ids.push(idx.add(v).unwrap());
        }
        assert_eq!(idx.len(), 50);
        let query = vec![10.0, 20.0];
        let results = idx.knn(&query, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1 < 1.0, "exact match should have ~zero distance, got {}", results[0].1);
    }

    #[test]
    fn remove_then_absent_from_results() {
        let idx = vec_index();
        let mut ids = Vec::new();
        for i in 0..30 {
            ids.push(idx.add(vec![i as f32, 0.0]).unwrap());
        }
        let victim = ids[5];
        idx.remove(victim).unwrap();
        assert_eq!(idx.len(), 29);
        let results = idx.knn(&vec![5.0, 0.0], 30).unwrap();
        assert!(!results.iter().any(|(id, _)| *id == victim));
    }

    #[test]
    fn remove_without_allow_removals_errors() {
        let idx: Index<Vec<f32>, f32> = Index::new(
            IndexParams::default().with_allow_removals(false),
            |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::SquaredEuclidean.distance(a, b),
        );
        let id = idx.add(vec![1.0]).unwrap();
        assert!(matches!(idx.remove(id), Err(Error::RemovalNotSupported)));
    }

    #[test]
    fn info_reports_consistent_layer_zero_count() {
        let idx = vec_index();
        for i in 0..40 {
            idx.add(vec![i as f32]).unwrap();
        }
        let info = idx.info();
        assert_eq!(info.per_layer[0].node_count, info.len);
    }

    #[test]
    fn multi_layer_knn_rejects_zero_k_and_inverted_range() {
        let idx = vec_index();
        idx.add(vec![0.0]).unwrap();
        assert!(matches!(idx.multi_layer_knn(&vec![0.0], 0, 0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(idx.multi_layer_knn(&vec![0.0], 1, 2, 1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn multi_layer_knn_window_bounds_returned_layers() {
        let idx = vec_index();
        for i in 0..200 {
            idx.add(vec![i as f32, (i * 2) as f32]).unwrap();
        }
        let top_layer = idx.info().per_layer.len() - 1;
        let query = vec![10.0, 20.0];

        let full = idx.multi_layer_knn(&query, 3, 0, top_layer).unwrap();
        assert_eq!(full.len(), top_layer + 1);

        let windowed = idx.multi_layer_knn(&query, 3, 0, 0).unwrap();
        assert_eq!(windowed.len(), 1, "window [0, 0] must report exactly layer 0");

        let out_of_range = idx.multi_layer_knn(&query, 3, top_layer + 5, top_layer + 9).unwrap();
        assert!(out_of_range.is_empty(), "a window entirely above the graph's top layer yields nothing");
    }
}
