//! An intrusive binary heap over `(id, dist)` pairs with a constructor-time
//! comparator, per spec §4.2.
//!
//! `search_layer` needs two heaps over the same `(NodeId, D)` element type
//! with opposite polarity: a min-heap of candidates to expand and a
//! max-heap of accepted results. Rather than keep two separate
//! implementations (or lean on `std::cmp::Reverse`, which only flips a
//! `std`-derived `Ord`), this is a single array-backed heap parameterized by
//! a comparator closure: "smaller is higher priority" by the comparator's
//! ordering pops first. Passing the inverted comparator flips polarity.

use crate::distance::Scalar;
use crate::arena::NodeId;
use std::cmp::Ordering;

/// One entry: a node id and its distance to the current query/pivot.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<D> {
    /// The candidate node.
    pub id: NodeId,
    /// Its distance to the query (or to the pivot being expanded).
    pub dist: D,
}

/// Total order over `D: Scalar` via `partial_cmp`, falling back to `Equal`
/// on an incomparable pair (e.g. `NaN`) rather than panicking: a
/// misbehaving user distance function must not be able to corrupt the heap
/// invariant or crash a query (spec §5, §3).
#[inline]
fn dist_cmp<D: Scalar>(a: &D, b: &D) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Comparator that makes the heap pop **smallest distance first**.
#[must_use]
pub fn ascending<D: Scalar>() -> impl Fn(&Candidate<D>, &Candidate<D>) -> Ordering + Copy {
    |a, b| dist_cmp(&a.dist, &b.dist)
}

/// Comparator that makes the heap pop **largest distance first**, the
/// inverse of [`ascending`], used for the "farthest accepted result" heap.
#[must_use]
pub fn descending<D: Scalar>() -> impl Fn(&Candidate<D>, &Candidate<D>) -> Ordering + Copy {
    |a, b| dist_cmp(&b.dist, &a.dist)
}

/// An array-backed binary heap whose priority order is defined by a
/// comparator supplied at construction time.
pub struct Heap<D, C> {
    data: Vec<Candidate<D>>,
    cmp: C,
}

impl<D: Scalar, C: Fn(&Candidate<D>, &Candidate<D>) -> Ordering> Heap<D, C> {
    /// Creates an empty heap using `cmp` to order elements: the element
    /// that compares as `Ordering::Less` under `cmp` has the higher
    /// priority and sits at the top.
    #[must_use]
    pub fn new(cmp: C) -> Self {
        Self { data: Vec::new(), cmp }
    }

    /// Creates an empty heap pre-sized for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize, cmp: C) -> Self {
        Self { data: Vec::with_capacity(capacity), cmp }
    }

    /// Number of elements currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The top (highest-priority) element, without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&Candidate<D>> {
        self.data.first()
    }

    /// Pushes a new element, O(log n).
    pub fn push(&mut self, item: Candidate<D>) {
        self.data.push(item);
        self.sift_up(self.data.len() - 1);
    }

    /// Removes and returns the top element, O(log n).
    pub fn pop(&mut self) -> Option<Candidate<D>> {
        if self.data.is_empty() {
            return None;
        }
        let last = self.data.len() - 1;
        self.data.swap(0, last);
        let top = self.data.pop();
        if !self.data.is_empty() {
            self.sift_down(0);
        }
        top
    }

    /// Consumes the heap, returning its elements in arbitrary (heap) order.
    #[must_use]
    pub fn into_vec(self) -> Vec<Candidate<D>> {
        self.data
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.cmp)(&self.data[a], &self.data[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.less(i, parent) {
                self.data.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.data.len();
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut smallest = i;
            if l < len && self.less(l, smallest) {
                smallest = l;
            }
            if r < len && self.less(r, smallest) {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.data.swap(i, smallest);
            i = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_heap_pops_ascending() {
        let mut h: Heap<f32, _> = Heap::new(ascending());
        for (id, dist) in [(1u32, 5.0f32), (2, 1.0), (3, 3.0)] {
            h.push(Candidate { id, dist });
        }
        let mut out = Vec::new();
        while let Some(c) = h.pop() {
            out.push(c.dist);
        }
        assert_eq!(out, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn max_heap_pops_descending() {
        let mut h: Heap<f32, _> = Heap::new(descending());
        for (id, dist) in [(1u32, 5.0f32), (2, 1.0), (3, 3.0)] {
            h.push(Candidate { id, dist });
        }
        let mut out = Vec::new();
        while let Some(c) = h.pop() {
            out.push(c.dist);
        }
        assert_eq!(out, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn peek_does_not_remove() {
        let mut h: Heap<f32, _> = Heap::new(ascending());
        h.push(Candidate { id: 1, dist: 2.0 });
        assert_eq!(h.peek().unwrap().dist, 2.0);
        assert_eq!(h.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn heap_pop_order_matches_sort(mut dists in proptest::collection::vec(-1000.0f32..1000.0, 0..100)) {
            let mut h: Heap<f32, _> = Heap::new(ascending());
            for (i, &d) in dists.iter().enumerate() {
                h.push(Candidate { id: i as u32, dist: d });
            }
            dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let mut out = Vec::new();
            while let Some(c) = h.pop() {
                out.push(c.dist);
            }
            proptest::prop_assert_eq!(out, dists);
        }
    }
}
