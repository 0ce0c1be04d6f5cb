//! Neighbor-selection heuristics (spec §4.6).
//!
//! A heuristic turns a candidate multiset into at most `m` neighbor ids.
//! The core calls it through the [`Heuristic`] trait so a caller can supply
//! their own; two conforming implementations ship here.

use crate::arena::NodeId;
use crate::distance::Scalar;
use crate::heap::Candidate;

/// A pluggable neighbor-selection strategy.
///
/// Implementations must return at most `m` ids drawn from `candidates`,
/// with no duplicates. `pairwise` computes the distance between two
/// candidate (or already-chosen) nodes, distinct from the distance each
/// candidate already carries to the query.
pub trait Heuristic<D: Scalar>: Send + Sync {
    /// Selects at most `m` ids from `candidates`.
    fn select(
        &self,
        candidates: &[Candidate<D>],
        pairwise: &dyn Fn(NodeId, NodeId) -> D,
        m: usize,
    ) -> Vec<NodeId>;
}

/// Relative-neighborhood pruning (spec §4.6): accept a candidate iff no
/// already-chosen result is closer to it than it is to the query. Promotes
/// diverse, well-connected graphs over raw nearness; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelativeNeighborhood;

impl<D: Scalar> Heuristic<D> for RelativeNeighborhood {
    fn select(
        &self,
        candidates: &[Candidate<D>],
        pairwise: &dyn Fn(NodeId, NodeId) -> D,
        m: usize,
    ) -> Vec<NodeId> {
        if candidates.len() < m {
            return candidates.iter().map(|c| c.id).collect();
        }

        let mut sorted: Vec<Candidate<D>> = candidates.to_vec();
        sorted.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(std::cmp::Ordering::Equal));

        let mut result: Vec<NodeId> = Vec::with_capacity(m);
        for c in sorted {
            if result.len() >= m {
                break;
            }
            let accepted = result.iter().all(|&r| pairwise(r, c.id) >= c.dist);
            if accepted {
                result.push(c.id);
            }
        }
        result
    }
}

/// The naive "M nearest by `dist`" fallback the spec explicitly sanctions
/// (§4.6, last paragraph): higher raw recall, more hub formation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestM;

impl<D: Scalar> Heuristic<D> for NearestM {
    fn select(
        &self,
        candidates: &[Candidate<D>],
        _pairwise: &dyn Fn(NodeId, NodeId) -> D,
        m: usize,
    ) -> Vec<NodeId> {
        let mut sorted: Vec<Candidate<D>> = candidates.to_vec();
        sorted.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap_or(std::cmp::Ordering::Equal));
        sorted.into_iter().take(m).map(|c| c.id).collect()
    }
}
