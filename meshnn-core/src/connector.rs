//! The Connector: turns a newly-arrived or departing label into graph edits
//! (spec §4.7). Everything in this module runs under the region lock for
//! whatever neighborhood it is about to touch: the lock ordering is always
//! "snapshot the neighbors, acquire the region lock, re-read, mutate", never
//! the reverse, mirroring the vectors-before-layers-before-neighbors
//! discipline the native graph this was grounded on documents for its own
//! bidirectional-connection routine.
//!
//! `connect_at_layer` is the one piece of real duplication this avoids:
//! insert, the original entry point's post-`update` repair, and a dirty
//! node's Phase B reconnect all boil down to "search this layer from a seed,
//! run the heuristic, wire up both directions" and share the same body.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::arena::{Arena, NodeId};
use crate::distance::Scalar;
use crate::heap::Candidate;
use crate::heuristic::Heuristic;
use crate::navigator::{self, Filter};
use crate::region_lock::RegionLocker;
use crate::visited::VisitedSetPool;

/// Everything a connector operation needs, bundled so call sites don't carry
/// eight separate parameters. Borrowed, never owned: [`crate::Index`] owns
/// all of these.
///
/// `ef_construction` and `max_edges` are plain `usize` snapshots (not a
/// borrowed [`crate::config::IndexParams`]) because both are runtime-mutable
/// on a live [`crate::Index`], each call reads the current value once at
/// connector-construction time rather than racing a setter mid-operation.
pub struct Connector<'a, L, D: Scalar> {
    pub arena: &'a Arena<L>,
    pub locker: &'a RegionLocker,
    pub entry_point_mutex: &'a Mutex<()>,
    pub ef_construction: usize,
    pub max_edges: usize,
    pub distance: &'a (dyn Fn(&L, &L) -> D + Send + Sync),
    pub heuristic: &'a (dyn Heuristic<D> + Send + Sync),
    pub visited_pool: &'a VisitedSetPool,
}

impl<'a, L: Clone, D: Scalar> Connector<'a, L, D> {
    /// Per-layer out-degree cap: `2 * max_edges` at layer 0, `max_edges`
    /// elsewhere (spec §4.7.1, §9 "layer-0 fatter than the rest").
    fn max_edges_for_layer(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_edges * 2
        } else {
            self.max_edges
        }
    }

    fn pairwise(&self, a: NodeId, b: NodeId) -> D {
        let la = self.arena.label(a);
        let lb = self.arena.label(b);
        match (la, lb) {
            (Some(la), Some(lb)) => (self.distance)(&la, &lb),
            _ => D::MAX,
        }
    }

    /// Inserts a freshly-allocated node into the graph (spec §4.7.1). The
    /// node must already exist in the arena (its label and layer sampled by
    /// [`Arena::add_item`]), this only wires its edges.
    pub fn connect_new_node(&self, id: NodeId) {
        let Some(node) = self.arena.node(id) else { return };
        let new_max_layer = node.max_layer();

        let guard = self.entry_point_mutex.lock();
        if self.arena.entry_point().is_none() {
            self.arena.set_entry_point(Some(id));
            return;
        }
        let entry = self.arena.entry_point().unwrap();
        let Some(entry_node) = self.arena.node(entry) else {
            self.arena.set_entry_point(Some(id));
            return;
        };
        let top_layer = entry_node.max_layer();
        let becomes_new_top = new_max_layer > top_layer;
        // Released immediately unless this insert will become the new top:
        // spec §9 prefers releasing the entry-point mutex as early as the
        // algorithm allows.
        let held_guard = becomes_new_top.then_some(guard);

        let Some(query_label) = self.arena.label(id) else { return };
        let delta = |nid: NodeId| -> D {
            self.arena
                .label(nid)
                .map_or(D::MAX, |l| (self.distance)(&query_label, &l))
        };
        let node_at = |nid: NodeId| self.arena.node(nid);

        let mut best_peer =
            navigator::find_entry_point(entry, top_layer, new_max_layer, &delta, &node_at, None);

        for l in (0..=new_max_layer.min(top_layer)).rev() {
            if let Some(next) = self.connect_at_layer(id, best_peer, l, None) {
                best_peer = next;
            }
        }

        if becomes_new_top {
            self.arena.set_entry_point(Some(id));
        }
        drop(held_guard);
    }

    /// Searches layer `l` from `peer`, selects neighbors via the configured
    /// heuristic, and wires bidirectional edges under the region lock.
    /// Returns the closest candidate found, to seed the next layer down.
    fn connect_at_layer(
        &self,
        v_id: NodeId,
        peer: NodeId,
        layer: usize,
        filter: Option<&Filter<'_>>,
    ) -> Option<NodeId> {
        let v_label = self.arena.label(v_id)?;
        let delta = |nid: NodeId| -> D {
            self.arena
                .label(nid)
                .map_or(D::MAX, |l| (self.distance)(&v_label, &l))
        };
        let node_at = |nid: NodeId| self.arena.node(nid);

        let mut visited = self.visited_pool.checkout();
        let cands = navigator::search_layer(
            &[peer],
            layer,
            self.ef_construction,
            &delta,
            &node_at,
            filter,
            &mut visited,
        );
        if cands.is_empty() {
            return None;
        }
        drop(visited);

        let pairwise = |a: NodeId, b: NodeId| self.pairwise(a, b);
        let max_m = self.max_edges_for_layer(layer);
        let chosen = self.heuristic.select(&cands, &pairwise, max_m);

        let snapshot = || {
            let mut s = Vec::with_capacity(chosen.len() + 1);
            s.push(v_id);
            s.extend(chosen.iter().copied());
            s
        };
        let _region = self.locker.acquire(snapshot);
        for &n in &chosen {
            self.connect(v_id, n, layer);
            self.connect(n, v_id, layer);
        }

        cands
            .iter()
            .min_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(Ordering::Equal))
            .map(|c| c.id)
    }

    /// Appends the edge `a -> b` at `layer`, with overflow-triggered
    /// re-pruning of `a`'s whole neighbor set (spec §4.7.2). Assumes the
    /// caller already holds the region lock covering `{a, b}`.
    pub fn connect(&self, a_id: NodeId, b_id: NodeId, layer: usize) {
        if a_id == b_id {
            return;
        }
        let Some(a) = self.arena.node(a_id) else { return };
        let max_m = self.max_edges_for_layer(layer);

        let mut newly_added = false;
        a.mutate_out(layer, |mut edges| {
            if !edges.contains(b_id) {
                edges.push(b_id);
                newly_added = true;
            }
            edges
        });
        if !newly_added {
            return;
        }

        if a.tracks_in_edges() {
            if let Some(b) = self.arena.node(b_id) {
                b.mutate_in(layer, |mut edges| {
                    if !edges.contains(a_id) {
                        edges.push(a_id);
                    }
                    edges
                });
            }
        }

        if a.out_edges(layer).len() <= max_m {
            return;
        }

        let old: Vec<NodeId> = a.out_edges(layer).as_slice().to_vec();
        let with_dist: Vec<Candidate<D>> = old
            .iter()
            .map(|&n| Candidate { id: n, dist: self.pairwise(a_id, n) })
            .collect();
        let pairwise = |x: NodeId, y: NodeId| self.pairwise(x, y);
        let new_set = self.heuristic.select(&with_dist, &pairwise, max_m);

        let old_set: HashSet<NodeId> = old.iter().copied().collect();
        let new_set_lookup: HashSet<NodeId> = new_set.iter().copied().collect();
        let removed: Vec<NodeId> = old.iter().copied().filter(|n| !new_set_lookup.contains(n)).collect();
        let added: Vec<NodeId> = new_set.iter().copied().filter(|n| !old_set.contains(n)).collect();

        a.set_out(layer, crate::arena::EdgeList::from_vec(new_set));

        if a.tracks_in_edges() {
            for r in removed {
                if let Some(rn) = self.arena.node(r) {
                    rn.mutate_in(layer, |mut e| {
                        e.remove(a_id);
                        e
                    });
                }
            }
            for x in added {
                if let Some(xn) = self.arena.node(x) {
                    xn.mutate_in(layer, |mut e| {
                        if !e.contains(a_id) {
                            e.push(a_id);
                        }
                        e
                    });
                }
            }
        }
    }

    /// Wipes `v`'s reverse edges at `layer` and repairs every former
    /// in-neighbor's out-edge list using `v`'s former out-neighbors as donor
    /// candidates, subject to the relative-neighborhood admission condition
    /// inlined directly per spec §4.7.3 (not the pluggable [`Heuristic`];
    /// this step is fixed regardless of configuration). Shared between
    /// node removal and `update`'s Phase A disconnect.
    fn disconnect_and_repair(&self, v_id: NodeId, layer: usize) {
        let Some(v) = self.arena.node(v_id) else { return };
        let donors: Vec<NodeId> = v.out_edges(layer).as_slice().to_vec();

        if v.tracks_in_edges() {
            for &n in &donors {
                if let Some(nn) = self.arena.node(n) {
                    nn.mutate_in(layer, |mut e| {
                        e.remove(v_id);
                        e
                    });
                }
            }
        }

        let incoming: Vec<NodeId> = v.in_edges(layer).as_slice().to_vec();
        let max_m = self.max_edges_for_layer(layer);

        for a_id in incoming {
            let Some(a) = self.arena.node(a_id) else { continue };
            a.mutate_out(layer, |mut e| {
                e.remove(v_id);
                e
            });

            let current_out: Vec<NodeId> = a.out_edges(layer).as_slice().to_vec();
            let mut candidates: Vec<Candidate<D>> = donors
                .iter()
                .copied()
                .filter(|&x| x != a_id && !current_out.contains(&x))
                .map(|x| Candidate { id: x, dist: self.pairwise(x, a_id) })
                .collect();
            candidates.sort_by(|p, q| p.dist.partial_cmp(&q.dist).unwrap_or(Ordering::Equal));

            for c in candidates {
                if a.out_edges(layer).len() >= max_m {
                    break;
                }
                let now_out: Vec<NodeId> = a.out_edges(layer).as_slice().to_vec();
                let admitted = now_out.iter().all(|&r| self.pairwise(r, c.id) >= c.dist);
                if !admitted {
                    continue;
                }
                a.mutate_out(layer, |mut e| {
                    if !e.contains(c.id) {
                        e.push(c.id);
                    }
                    e
                });
                if a.tracks_in_edges() {
                    if let Some(cn) = self.arena.node(c.id) {
                        cn.mutate_in(layer, |mut e| {
                            if !e.contains(a_id) {
                                e.push(a_id);
                            }
                            e
                        });
                    }
                }
            }
        }
    }

    /// Removes `v` from the graph entirely (spec §4.7.3): top-down,
    /// per-layer entry-point handover, reverse-edge wipe, repair, and
    /// finally (at layer 0) the arena slot itself.
    pub fn remove_node_connections(&self, v_id: NodeId) {
        let Some(v) = self.arena.node(v_id) else { return };
        let max_layer = v.max_layer();

        for l in (0..=max_layer).rev() {
            let snapshot = || {
                let mut s = vec![v_id];
                if let Some(vv) = self.arena.node(v_id) {
                    s.extend(vv.out_edges(l).as_slice());
                    s.extend(vv.in_edges(l).as_slice());
                }
                s
            };
            let _region = self.locker.acquire(snapshot);

            if self.arena.entry_point() == Some(v_id) {
                let outs: Vec<NodeId> = v.out_edges(l).as_slice().to_vec();
                let mut best: Option<(NodeId, usize)> = None;
                for n in outs {
                    if let Some(nn) = self.arena.node(n) {
                        let deg = nn.out_edges(l).len();
                        if best.is_none_or(|(_, bd)| deg > bd) {
                            best = Some((n, deg));
                        }
                    }
                }
                match best {
                    Some((n, _)) => {
                        tracing::debug!(removed = v_id, new_entry_point = n, layer = l, "entry-point handover");
                        self.arena.set_entry_point(Some(n));
                    }
                    None if l == 0 => {
                        tracing::debug!(removed = v_id, "entry-point handover: graph now empty");
                        self.arena.set_entry_point(None);
                    }
                    None => {}
                }
            }

            self.disconnect_and_repair(v_id, l);

            if l == 0 {
                self.arena.remove_item(v_id);
            }
        }
    }

    /// Selectively disconnects and reconnects the labels named by `indexes`
    /// (spec §4.7.4). Two phases: disconnect every layer whose neighborhood
    /// the new label invalidates, tracking the deepest dirty layer per node
    /// in `dirty_by_index`; then reconnect every dirty node top-down using a
    /// dirty-aware filter so Phase B never routes through another node that
    /// is itself still waiting to be repaired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LengthMismatch`] if `indexes.len() !=
    /// new_labels.len()`.
    pub fn update(&self, indexes: &[NodeId], new_labels: &[L]) -> crate::error::Result<()> {
        if indexes.len() != new_labels.len() {
            return Err(crate::error::Error::LengthMismatch {
                indexes: indexes.len(),
                labels: new_labels.len(),
            });
        }

        let top_layer = self
            .arena
            .entry_point()
            .and_then(|e| self.arena.node(e))
            .map_or(0, |n| n.max_layer());

        // DashMap rather than a single `Mutex<FxHashMap<..>>`: Phase A's
        // per-node disconnect work is embarrassingly parallel (each entry is
        // owned by exactly one node), so a sharded concurrent map avoids
        // serializing writers that touch unrelated nodes, the one place in
        // this crate where that property, rather than the atomic
        // multi-key check the region lock needs, is actually what's wanted.
        let dirty_by_index: DashMap<NodeId, i64> = DashMap::new();
        let clean_anchors: Vec<AtomicI64> = (0..=top_layer)
            .map(|_| AtomicI64::new(self.arena.entry_point().map_or(-1, i64::from)))
            .collect();
        let original_entry = self.arena.entry_point();

        let run_phase_a = |i: NodeId, new_label: &L| {
            let Some(node) = self.arena.node(i) else { return };
            let Some(old_label) = self.arena.label(i) else { return };
            let delta_change = (self.distance)(new_label, &old_label);
            if !(delta_change > D::ZERO) {
                self.arena.set_label(i, new_label.clone());
                return;
            }

            for l in 0..=node.max_layer() {
                let snapshot = || {
                    let mut s = vec![i];
                    if let Some(n) = self.arena.node(i) {
                        s.extend(n.out_edges(l).as_slice());
                        s.extend(n.in_edges(l).as_slice());
                    }
                    s
                };
                let _region = self.locker.acquire(snapshot);

                let out = node.out_edges(l);
                if out.is_empty() {
                    continue;
                }
                let mu = out
                    .as_slice()
                    .iter()
                    .filter_map(|&n| self.arena.label(n).map(|l2| (self.distance)(new_label, &l2)))
                    .fold(D::MAX, |acc, d| if d < acc { d } else { acc });
                if !(delta_change >= mu) {
                    continue;
                }

                dirty_by_index.insert(i, l as i64);
                if clean_anchors[l].load(AtomicOrdering::Acquire) == i64::from(i) {
                    let replacement = out
                        .as_slice()
                        .iter()
                        .filter(|&&n| n != i)
                        .max_by_key(|&&n| self.arena.node(n).map_or(0, |nn| nn.out_edges(l).len()));
                    clean_anchors[l]
                        .store(replacement.map_or(-1, |&n| i64::from(n)), AtomicOrdering::Release);
                }

                self.disconnect_and_repair(i, l);
                let empty_cap = self.max_edges_for_layer(l);
                node.set_out(l, crate::arena::EdgeList::with_capacity(empty_cap));
                node.set_in(l, crate::arena::EdgeList::with_capacity(empty_cap));
            }

            self.arena.set_label(i, new_label.clone());
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            indexes
                .par_iter()
                .zip(new_labels.par_iter())
                .for_each(|(&i, l)| run_phase_a(i, l));
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (&i, l) in indexes.iter().zip(new_labels.iter()) {
                run_phase_a(i, l);
            }
        }

        // The original entry point, if it went dirty, is repaired first,
        // with the per-layer anchors collected during Phase A rather than a
        // fresh top-down search, since the global entry point it would
        // otherwise search from is itself the node being repaired.
        if let Some(oe) = original_entry {
            if dirty_by_index.contains_key(&oe) {
                for l in (0..=top_layer).rev() {
                    let anchor = clean_anchors[l].load(AtomicOrdering::Acquire);
                    if anchor >= 0 {
                        self.connect_at_layer(oe, anchor as NodeId, l, None);
                    }
                }
                dirty_by_index.remove(&oe);
            }
        }

        let remaining: Vec<NodeId> = dirty_by_index.iter().map(|e| *e.key()).collect();
        for i in remaining {
            let Some(top_l) = dirty_by_index.get(&i).map(|v| *v) else { continue };
            let Some(node) = self.arena.node(i) else { continue };
            let Some(entry) = self.arena.entry_point() else { continue };
            let global_top = self
                .arena
                .node(entry)
                .map_or(0, |n| n.max_layer());

            let i_label = match self.arena.label(i) {
                Some(l) => l,
                None => continue,
            };
            let delta = |nid: NodeId| -> D {
                self.arena.label(nid).map_or(D::MAX, |l| (self.distance)(&i_label, &l))
            };
            let node_at = |nid: NodeId| self.arena.node(nid);

            let mut peer = {
                let filter: &Filter<'_> = &|c: NodeId| {
                    c != i && dirty_by_index.get(&c).map(|v| *v).unwrap_or(-1) < top_l
                };
                navigator::find_entry_point(
                    entry,
                    global_top,
                    node.max_layer().min(top_l as usize),
                    &delta,
                    &node_at,
                    Some(filter),
                )
            };

            for l in (0..=top_l as usize).rev() {
                let filter: &Filter<'_> = &|c: NodeId| {
                    c != i && dirty_by_index.get(&c).map(|v| *v).unwrap_or(-1) < l as i64
                };
                match self.connect_at_layer(i, peer, l, Some(filter)) {
                    Some(next) => peer = next,
                    None => {
                        if let Some(e) = self.arena.entry_point() {
                            peer = e;
                        }
                    }
                }
            }

            dirty_by_index.remove(&i);
        }

        Ok(())
    }
}
