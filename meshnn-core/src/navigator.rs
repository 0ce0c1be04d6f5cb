//! Greedy descent and best-first beam search over a single layer (spec
//! §4.5). The Navigator never acquires a region lock: every read here is a
//! lock-free [`arc_swap`] load via [`crate::arena::Node::out_edges`], which
//! is what keeps query throughput scaling with core count (spec §5, §9).

use crate::arena::{Node, NodeId};
use crate::distance::Scalar;
use crate::heap::{ascending, descending, Candidate, Heap};
use crate::visited::VisitedSet;
use std::sync::Arc;

/// A predicate a candidate id must pass to be eligible as a query result.
/// Candidates that fail the filter may still be traversed (spec §4.5),
/// the filter only gates what can become a *result*, never what the search
/// is allowed to walk through.
pub type Filter<'a> = dyn Fn(NodeId) -> bool + 'a;

/// Greedy descent from `entry` across layers `top_layer` down to
/// `target_layer + 1`, returning the best node found at `target_layer + 1`'s
/// floor, the seed the caller hands to [`search_layer`] at `target_layer`.
///
/// `node_at` resolves a [`NodeId`] to its [`Node`] record; `delta` computes
/// the query's distance to a node's stored label.
pub fn find_entry_point<D: Scalar>(
    entry: NodeId,
    top_layer: usize,
    target_layer: usize,
    delta: &impl Fn(NodeId) -> D,
    node_at: &impl Fn(NodeId) -> Option<Arc<Node>>,
    filter: Option<&Filter<'_>>,
) -> NodeId {
    let mut current = entry;
    let mut current_dist = delta(entry);
    let mut best = entry;
    let mut best_dist = current_dist;

    if top_layer <= target_layer {
        return entry;
    }

    for layer in (target_layer + 1..=top_layer).rev() {
        loop {
            let Some(node) = node_at(current) else { break };
            let neighbors = node.out_edges(layer);
            let mut improved = false;
            for &n in neighbors.as_slice() {
                let d = delta(n);
                if d < current_dist {
                    current = n;
                    current_dist = d;
                    improved = true;
                }
                let passes = filter.is_none_or(|f| f(n));
                if passes && d < best_dist {
                    best = n;
                    best_dist = d;
                }
            }
            if !improved {
                break;
            }
        }
    }

    if filter.is_some() {
        best
    } else {
        current
    }
}

/// Best-first beam search at a single layer: the characteristic HNSW
/// search, returning up to `k` candidates (unsorted heap order; the
/// caller sorts ascending by distance once it has decided how many to
/// keep).
pub fn search_layer<D: Scalar>(
    entry_points: &[NodeId],
    layer: usize,
    k: usize,
    delta: &impl Fn(NodeId) -> D,
    node_at: &impl Fn(NodeId) -> Option<Arc<Node>>,
    filter: Option<&Filter<'_>>,
    visited: &mut VisitedSet,
) -> Vec<Candidate<D>> {
    let mut candidates: Heap<D, _> = Heap::new(ascending());
    let mut results: Heap<D, _> = Heap::new(descending());

    for &ep in entry_points {
        if !visited.visit(ep) {
            continue;
        }
        let d = delta(ep);
        candidates.push(Candidate { id: ep, dist: d });
        if filter.is_none_or(|f| f(ep)) {
            results.push(Candidate { id: ep, dist: d });
        }
    }

    let mut worst_accepted = results.peek().map_or(D::MAX, |c| c.dist);

    while let Some(c) = candidates.peek().copied() {
        if c.dist > worst_accepted && results.len() >= k {
            break;
        }
        candidates.pop();

        let Some(node) = node_at(c.id) else { continue };
        let neighbors = node.out_edges(layer);
        for &n in neighbors.as_slice() {
            if !visited.visit(n) {
                continue;
            }
            let d = delta(n);
            if results.len() < k || d < worst_accepted {
                candidates.push(Candidate { id: n, dist: d });
                if filter.is_none_or(|f| f(n)) {
                    results.push(Candidate { id: n, dist: d });
                    if results.len() > k {
                        results.pop();
                    }
                    worst_accepted = results.peek().map_or(D::MAX, |r| r.dist);
                }
            }
        }
    }

    results.into_vec()
}

/// Identical skeleton to [`search_layer`], but admits every candidate
/// within `radius` rather than capping at `k` (spec §4.5's `range_search`).
pub fn range_search<D: Scalar>(
    entry_points: &[NodeId],
    layer: usize,
    radius: D,
    delta: &impl Fn(NodeId) -> D,
    node_at: &impl Fn(NodeId) -> Option<Arc<Node>>,
    filter: Option<&Filter<'_>>,
    visited: &mut VisitedSet,
) -> Vec<Candidate<D>> {
    let mut candidates: Heap<D, _> = Heap::new(ascending());
    let mut results: Vec<Candidate<D>> = Vec::new();

    for &ep in entry_points {
        if !visited.visit(ep) {
            continue;
        }
        let d = delta(ep);
        candidates.push(Candidate { id: ep, dist: d });
        if d <= radius && filter.is_none_or(|f| f(ep)) {
            results.push(Candidate { id: ep, dist: d });
        }
    }

    while let Some(c) = candidates.peek().copied() {
        if c.dist > radius {
            break;
        }
        candidates.pop();

        let Some(node) = node_at(c.id) else { continue };
        let neighbors = node.out_edges(layer);
        for &n in neighbors.as_slice() {
            if !visited.visit(n) {
                continue;
            }
            let d = delta(n);
            if d <= radius {
                candidates.push(Candidate { id: n, dist: d });
                if filter.is_none_or(|f| f(n)) {
                    results.push(Candidate { id: n, dist: d });
                }
            }
        }
    }

    results
}
