//! The region-lock protocol: fine-grained, re-entrant mutual exclusion over
//! a node's *neighborhood* (spec §4.4), the piece that lets `add`/`remove`/
//! `update` proceed concurrently without a global write lock.
//!
//! A neighborhood is `{v} ∪ out(v,l) ∪ in(v,l)`, a set that can change
//! shape the instant before the lock is actually held, which is why
//! acquisition is snapshot-then-validate rather than a single compare-and-
//! lock. The table is a single `Mutex`-guarded map plus a `Condvar`: every
//! acquire/release is a monitor operation, never a lock-free CAS, because
//! the wait condition ("every id in S is free-or-ours") spans an arbitrary
//! number of keys and must be checked and updated atomically as one unit.

use crate::arena::node::NodeId;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::thread::{self, ThreadId};

#[derive(Clone, Copy)]
struct Owner {
    thread: ThreadId,
    reentrancy: u32,
}

struct State {
    owners: FxHashMap<NodeId, Owner>,
}

/// Process-wide (well: index-wide) table of node-id ownership.
pub struct RegionLocker {
    state: Mutex<State>,
    cond: Condvar,
}

impl Default for RegionLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionLocker {
    /// Creates an empty locker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { owners: FxHashMap::default() }),
            cond: Condvar::new(),
        }
    }

    fn free_or_ours(state: &State, id: NodeId, me: ThreadId) -> bool {
        state.owners.get(&id).is_none_or(|o| o.thread == me)
    }

    fn mark(state: &mut State, id: NodeId, me: ThreadId) {
        state
            .owners
            .entry(id)
            .and_modify(|o| o.reentrancy += 1)
            .or_insert(Owner { thread: me, reentrancy: 1 });
    }

    fn unmark(state: &mut State, id: NodeId) {
        if let std::collections::hash_map::Entry::Occupied(mut e) = state.owners.entry(id) {
            let o = e.get_mut();
            if o.reentrancy <= 1 {
                e.remove();
            } else {
                o.reentrancy -= 1;
            }
        }
    }

    /// Acquires the neighborhood named by repeatedly calling `snapshot`
    /// (which must return `{v} ∪ out(v,l) ∪ in(v,l)` for whatever node/layer
    /// the caller is locking). Blocks on the condvar while the snapshot's
    /// ids are held by another thread; re-entrant for the calling thread
    /// (spec §4.4, §9; the Connector relies on this when a structural
    /// mutation recursively locks a neighbor's neighborhood for pruning).
    pub fn acquire(&self, snapshot: impl Fn() -> Vec<NodeId>) -> RegionLockGuard<'_> {
        let me = thread::current().id();
        loop {
            let s0 = snapshot();

            {
                let mut state = self.state.lock();
                while !s0.iter().all(|&id| Self::free_or_ours(&state, id, me)) {
                    self.cond.wait(&mut state);
                }
                for &id in &s0 {
                    Self::mark(&mut state, id, me);
                }
            }

            // Validate: the neighborhood may have changed shape between the
            // snapshot we just locked and now.
            let s1 = snapshot();
            let extras: Vec<NodeId> = s1.iter().copied().filter(|id| !s0.contains(id)).collect();
            let removed: Vec<NodeId> = s0.iter().copied().filter(|id| !s1.contains(id)).collect();

            let mut state = self.state.lock();
            let extras_ok = extras.iter().all(|&id| Self::free_or_ours(&state, id, me));
            if extras_ok {
                for &id in &extras {
                    Self::mark(&mut state, id, me);
                }
                for &id in &removed {
                    Self::unmark(&mut state, id);
                }
                drop(state);
                self.cond.notify_all();
                return RegionLockGuard { locker: self, held: s1 };
            }

            for &id in &s0 {
                Self::unmark(&mut state, id);
            }
            drop(state);
            self.cond.notify_all();
            tracing::trace!(
                s0_len = s0.len(),
                extras_len = extras.len(),
                "region lock acquire retrying: validation found a busy extra"
            );
            // retry the whole sequence from a fresh snapshot
        }
    }

    fn release(&self, held: &[NodeId]) {
        let mut state = self.state.lock();
        for &id in held {
            Self::unmark(&mut state, id);
        }
        drop(state);
        self.cond.notify_all();
    }
}

/// RAII guard over a held neighborhood. Unmarks every held id and wakes
/// waiters on drop.
pub struct RegionLockGuard<'a> {
    locker: &'a RegionLocker,
    held: Vec<NodeId>,
}

impl RegionLockGuard<'_> {
    /// The validated set of ids actually held by this guard (`S₁` of spec
    /// §4.4 step 3), may differ from the set initially snapshotted.
    #[must_use]
    pub fn held(&self) -> &[NodeId] {
        &self.held
    }
}

impl Drop for RegionLockGuard<'_> {
    fn drop(&mut self) {
        self.locker.release(&self.held);
    }
}
