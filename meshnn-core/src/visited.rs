//! Pooled, epoch-tagged "has this id been seen in the current search"
//! structure (spec §4.5's visited set / §9's pooled-visited-sets note).
//!
//! Allocating a fresh bitmap per query is the dominant allocation in a
//! throughput workload. Instead, each slot carries a version tag; "visited"
//! means `slot[id] == current_version`. Checking a set back out of the pool
//! just bumps the version, amortized O(1) per search instead of O(capacity)
//! to zero a fresh bitmap, with a full zero-out only on the rare version
//! wraparound (every ~32k checkouts of a given set).

use crate::arena::{node::NodeId, ReallocationObserver};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single reusable "seen" set, auto-extending to the graph's current
/// capacity.
pub struct VisitedSet {
    slots: Vec<i16>,
    version: i16,
}

impl VisitedSet {
    fn new(capacity: usize) -> Self {
        Self { slots: vec![0; capacity], version: 0 }
    }

    fn ensure_capacity(&mut self, capacity: usize) {
        if self.slots.len() < capacity {
            self.slots.resize(capacity, 0);
        }
    }

    /// Starts a new search: bumps the version, zeroing the whole array only
    /// when the version tag has wrapped back to the sentinel `0`.
    fn begin_search(&mut self) {
        let (next, overflowed) = self.version.overflowing_add(1);
        if overflowed || next == 0 {
            self.slots.iter_mut().for_each(|s| *s = 0);
            self.version = 1;
        } else {
            self.version = next;
        }
    }

    /// Marks `id` visited. Returns `true` if this is the first time in the
    /// current search (matching `HashSet::insert`'s return convention).
    /// Growing the slot vector here (rather than only in `ensure_capacity`)
    /// tolerates a concurrent graph growth the pool hasn't been notified of
    /// yet; reading an id "beyond current length" degrades to "not
    /// visited" instead of panicking (spec §5).
    pub fn visit(&mut self, id: NodeId) -> bool {
        let idx = id as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, 0);
        }
        if self.slots[idx] == self.version {
            false
        } else {
            self.slots[idx] = self.version;
            true
        }
    }

    /// Whether `id` has been visited in the current search, without marking
    /// it.
    #[must_use]
    pub fn is_visited(&self, id: NodeId) -> bool {
        self.slots.get(id as usize).is_some_and(|&v| v == self.version)
    }
}

/// A pool of [`VisitedSet`]s shared across concurrent searches.
///
/// Implements [`ReallocationObserver`] so the arena's growth event extends
/// the pool's recorded capacity before any new search can observe it (spec
/// §4.3, §5): the next checkout resizes lazily to the new capacity rather
/// than every outstanding set being resized eagerly.
pub struct VisitedSetPool {
    free_tx: crossbeam_channel::Sender<VisitedSet>,
    free_rx: crossbeam_channel::Receiver<VisitedSet>,
    capacity: AtomicUsize,
}

impl VisitedSetPool {
    /// Creates a pool whose sets start pre-sized to `initial_capacity`.
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        let (free_tx, free_rx) = crossbeam_channel::unbounded();
        Self { free_tx, free_rx, capacity: AtomicUsize::new(initial_capacity) }
    }

    /// Checks out a set, reset for a new search. Reused from the pool when
    /// one is free; otherwise allocated fresh.
    #[must_use]
    pub fn checkout(&self) -> PooledVisitedSet<'_> {
        let capacity = self.capacity.load(Ordering::Acquire);
        let mut set = self
            .free_rx
            .try_recv()
            .unwrap_or_else(|_| VisitedSet::new(capacity));
        set.ensure_capacity(capacity);
        set.begin_search();
        PooledVisitedSet { set: Some(set), pool: self }
    }
}

impl ReallocationObserver for VisitedSetPool {
    fn on_reallocation(&self, new_capacity: usize) {
        self.capacity.store(new_capacity, Ordering::Release);
    }
}

/// RAII checkout: returns the set to the pool on drop instead of
/// deallocating it.
pub struct PooledVisitedSet<'a> {
    set: Option<VisitedSet>,
    pool: &'a VisitedSetPool,
}

impl std::ops::Deref for PooledVisitedSet<'_> {
    type Target = VisitedSet;
    fn deref(&self) -> &VisitedSet {
        self.set.as_ref().expect("set taken only on drop")
    }
}

impl std::ops::DerefMut for PooledVisitedSet<'_> {
    fn deref_mut(&mut self) -> &mut VisitedSet {
        self.set.as_mut().expect("set taken only on drop")
    }
}

impl Drop for PooledVisitedSet<'_> {
    fn drop(&mut self) {
        if let Some(set) = self.set.take() {
            // An unbounded channel send only fails if every receiver (the
            // pool itself) was dropped, which can't happen while this
            // borrow is alive.
            let _ = self.pool.free_tx.send(set);
        }
    }
}
