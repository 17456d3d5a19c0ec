//! Author-controlled lock that forbids rolling back past a narrative checkpoint.
//!
//! Ring indices grow toward the past (index 0 is the newest capture), so the
//! lock is stored as an upper bound on the index a rollback may land on.
//! [`LockGate::block`] pins that bound to the newest capture at the time of
//! the call; the owning [`HistoryRing`](crate::ring::HistoryRing) then keeps it
//! pointing at the same snapshot as captures are pushed and the future tail
//! is discarded.
//!
//! ```
//! use rewind_history::lock::LockGate;
//!
//! let mut gate = LockGate::default();
//! gate.block(3);
//! assert!(!gate.forbids(0));
//! assert!(gate.forbids(1));
//!
//! gate.unblock();
//! assert!(!gate.forbids(1));
//! ```

use serde::{Deserialize, Serialize};

/// A lock state change the controller should report to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockTransition {
    Blocked,
    Unblocked,
}

/// The lock gate.
///
/// `lock_index` is `None` either when unlocked or when the lock was placed
/// on an empty ring (nothing older exists, so nothing is forbidden).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockGate {
    locked: bool,
    lock_index: Option<usize>,
}

impl LockGate {
    /// Lock rollback at the newest capture of a ring holding `ring_len`
    /// snapshots.
    pub fn block(&mut self, ring_len: usize) -> LockTransition {
        self.locked = true;
        self.lock_index = if ring_len > 0 { Some(0) } else { None };
        LockTransition::Blocked
    }

    pub fn unblock(&mut self) -> LockTransition {
        self.locked = false;
        self.lock_index = None;
        LockTransition::Unblocked
    }

    /// Whether a `block` is in effect.
    ///
    /// A lock placed on an empty ring stays set with no
    /// [`lock_index`](Self::lock_index): it forbids nothing and, having no
    /// snapshot to lose, is never released by eviction or discard. Only
    /// [`unblock`](Self::unblock) clears it.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock_index(&self) -> Option<usize> {
        self.lock_index
    }

    /// Whether a rollback landing on ring index `index` is forbidden.
    pub fn forbids(&self, index: usize) -> bool {
        match (self.locked, self.lock_index) {
            (true, Some(lock)) => index > lock,
            _ => false,
        }
    }

    /// A snapshot was pushed in front: the locked one moved one step back.
    pub(crate) fn shift_back(&mut self) {
        if let Some(lock) = self.lock_index.as_mut() {
            *lock += 1;
        }
    }

    /// `n` snapshots were removed from the front. Returns `true` if this
    /// removed the locked snapshot and released the lock.
    pub(crate) fn shift_front(&mut self, n: usize) -> bool {
        match self.lock_index {
            Some(lock) if lock >= n => {
                self.lock_index = Some(lock - n);
                false
            }
            Some(_) => {
                self.unblock();
                true
            }
            None => false,
        }
    }

    /// The ring now holds `len` snapshots after evicting from the back.
    /// Returns `true` if the locked snapshot was evicted and the lock released.
    pub(crate) fn truncate(&mut self, len: usize) -> bool {
        match self.lock_index {
            Some(lock) if lock >= len => {
                self.unblock();
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
