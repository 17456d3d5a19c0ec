//! Bounded, newest-first ring of snapshots with a viewing cursor.
//!
//! [`HistoryRing`] owns three things that must move together:
//!
//! - the snapshots themselves, index 0 being the most recent capture;
//! - the cursor, `None` while the player is at the live state and
//!   `Some(i)` while snapshot `i` is on screen;
//! - the [`LockGate`], whose index is renormalized on every push and discard
//!   so it keeps naming the same snapshot.
//!
//! # Layout
//!
//! ```text
//! push_front(D)          [D, C, B, A]      cursor: None
//!                         0  1  2  3
//! cursor = Some(2)       [D, C, B, A]      viewing B
//! commit_branch()        [B, A]            cursor: None  (D and C are gone)
//! ```
//!
//! Capacity is read at push time only: lowering it with
//! [`set_capacity`](HistoryRing::set_capacity) does not trim existing
//! overflow until the next capture arrives.

use std::collections::VecDeque;

use crate::lock::{LockGate, LockTransition};
use crate::snapshot::Snapshot;

/// Default number of snapshots kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by ring operations that take caller-supplied bounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// Capacity must be a positive integer.
    #[error("history capacity must be at least 1")]
    ZeroCapacity,

    /// A cursor was placed past the oldest snapshot.
    #[error("cursor {index} out of range for history of {len} snapshots")]
    CursorOutOfRange { index: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a [`HistoryRing::push_front`] did besides inserting.
#[derive(Debug, Default)]
pub struct PushOutcome {
    /// Snapshots evicted from the back, oldest last.
    pub evicted: Vec<Snapshot>,
    /// The locked snapshot was evicted and the lock released.
    pub lock_released: bool,
}

/// What a discard from the front removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscardOutcome {
    /// Number of snapshots removed from the front.
    pub discarded: usize,
    /// The locked snapshot was among them and the lock released.
    pub lock_released: bool,
}

// ---------------------------------------------------------------------------
// HistoryRing
// ---------------------------------------------------------------------------

/// The bounded history ring.
///
/// # Invariants
///
/// 1. `len() <= capacity()` after every [`push_front`](Self::push_front).
/// 2. `cursor()` is `None` or `Some(i)` with `i < len()`.
/// 3. While locked with an index, `lock().lock_index() < Some(len())`.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
    cursor: Option<usize>,
    lock: LockGate,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self {
            snapshots: VecDeque::new(),
            capacity: DEFAULT_CAPACITY,
            cursor: None,
            lock: LockGate::default(),
        }
    }
}

impl HistoryRing {
    /// Create an empty ring holding at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            ..Default::default()
        })
    }

    // -- capture / prune ----------------------------------------------------

    /// Insert a fresh capture at the front.
    ///
    /// The lock index (if any) moves one step toward the past, the oldest
    /// snapshots are evicted while the ring exceeds its capacity, and the
    /// cursor returns to live.
    pub fn push_front(&mut self, snapshot: Snapshot) -> PushOutcome {
        self.snapshots.push_front(snapshot);
        self.lock.shift_back();
        self.cursor = None;

        let mut outcome = PushOutcome::default();
        while self.snapshots.len() > self.capacity {
            match self.snapshots.pop_back() {
                Some(evicted) => outcome.evicted.push(evicted),
                None => break,
            }
        }
        if !outcome.evicted.is_empty() {
            outcome.lock_released = self.lock.truncate(self.snapshots.len());
            tracing::trace!(
                evicted = outcome.evicted.len(),
                len = self.snapshots.len(),
                capacity = self.capacity,
                "evicted oldest snapshots"
            );
        }
        outcome
    }

    /// Remove the `n` newest snapshots.
    ///
    /// The lock index moves `n` steps toward the front; if the locked
    /// snapshot itself is removed the lock is released. A cursor pointing
    /// into the removed range returns to live, any other cursor is shifted
    /// so it keeps naming the same snapshot.
    pub fn discard_front(&mut self, n: usize) -> DiscardOutcome {
        let n = n.min(self.snapshots.len());
        if n == 0 {
            return DiscardOutcome::default();
        }
        self.snapshots.drain(..n);
        let lock_released = self.lock.shift_front(n);
        self.cursor = match self.cursor {
            Some(index) if index >= n => Some(index - n),
            _ => None,
        };
        DiscardOutcome {
            discarded: n,
            lock_released,
        }
    }

    /// Commit to continuing from the snapshot under the cursor.
    ///
    /// Everything newer than the cursor is discarded (the snapshot under the
    /// cursor is the branch point and stays), then the cursor returns to
    /// live. From live, or while viewing index 0, nothing is discarded.
    pub fn commit_branch(&mut self) -> DiscardOutcome {
        let outcome = match self.cursor {
            Some(index) if index > 0 => self.discard_front(index),
            _ => DiscardOutcome::default(),
        };
        self.cursor = None;
        outcome
    }

    /// Drop every snapshot, return to live and release any lock.
    ///
    /// Returns `true` if a lock was released.
    pub fn clear(&mut self) -> bool {
        self.snapshots.clear();
        self.cursor = None;
        let was_locked = self.lock.is_locked();
        self.lock.unblock();
        was_locked
    }

    // -- cursor -------------------------------------------------------------

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Place the cursor. `None` returns to live.
    pub fn set_cursor(&mut self, cursor: Option<usize>) -> Result<(), RingError> {
        if let Some(index) = cursor {
            if index >= self.snapshots.len() {
                return Err(RingError::CursorOutOfRange {
                    index,
                    len: self.snapshots.len(),
                });
            }
        }
        self.cursor = cursor;
        Ok(())
    }

    /// The snapshot under the cursor, if viewing one.
    pub fn current(&self) -> Option<&Snapshot> {
        self.cursor.and_then(|index| self.snapshots.get(index))
    }

    // -- lock ---------------------------------------------------------------

    /// Lock rollback at the current newest capture.
    pub fn block(&mut self) -> LockTransition {
        self.lock.block(self.snapshots.len())
    }

    pub fn unblock(&mut self) -> LockTransition {
        self.lock.unblock()
    }

    pub fn lock(&self) -> &LockGate {
        &self.lock
    }

    // -- capacity / access --------------------------------------------------

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity. Takes effect at the next push.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot at `index` (0 = newest).
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// The most recent capture.
    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentRef, InteractionState, StateRecord};

    fn snap(text: &str) -> Snapshot {
        Snapshot::new(
            StateRecord::at(DocumentRef::new("doc"), 0).with_text(text, None),
            InteractionState::Idle,
            None,
        )
    }

    fn texts(ring: &HistoryRing) -> Vec<String> {
        ring.iter().map(|s| s.record().text.clone()).collect()
    }

    fn ring_of(capacity: usize, oldest_first: &[&str]) -> HistoryRing {
        let mut ring = HistoryRing::new(capacity).unwrap();
        for text in oldest_first {
            ring.push_front(snap(text));
        }
        ring
    }

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(HistoryRing::new(0).unwrap_err(), RingError::ZeroCapacity);
        let mut ring = HistoryRing::default();
        assert_eq!(ring.set_capacity(0).unwrap_err(), RingError::ZeroCapacity);
        assert_eq!(ring.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn push_front_orders_newest_first() {
        let ring = ring_of(10, &["A", "B", "C"]);
        assert_eq!(texts(&ring), vec!["C", "B", "A"]);
        assert_eq!(ring.newest().map(|s| s.record().text.as_str()), Some("C"));
    }

    #[test]
    fn push_front_evicts_oldest_beyond_capacity() {
        let mut ring = ring_of(2, &["A", "B"]);
        let outcome = ring.push_front(snap("C"));
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].record().text, "A");
        assert_eq!(texts(&ring), vec!["C", "B"]);
    }

    #[test]
    fn push_front_resets_cursor() {
        let mut ring = ring_of(10, &["A", "B", "C"]);
        ring.set_cursor(Some(2)).unwrap();
        ring.push_front(snap("D"));
        assert_eq!(ring.cursor(), None);
    }

    #[test]
    fn lowered_capacity_applies_at_next_push() {
        let mut ring = ring_of(10, &["A", "B", "C", "D"]);
        ring.set_capacity(2).unwrap();
        assert_eq!(ring.len(), 4);

        let outcome = ring.push_front(snap("E"));
        assert_eq!(outcome.evicted.len(), 3);
        assert_eq!(texts(&ring), vec!["E", "D"]);
    }

    #[test]
    fn set_cursor_is_bounds_checked() {
        let mut ring = ring_of(10, &["A", "B"]);
        assert_eq!(
            ring.set_cursor(Some(2)).unwrap_err(),
            RingError::CursorOutOfRange { index: 2, len: 2 }
        );
        ring.set_cursor(Some(1)).unwrap();
        assert_eq!(ring.current().map(|s| s.record().text.as_str()), Some("A"));
        ring.set_cursor(None).unwrap();
        assert!(ring.current().is_none());
    }

    #[test]
    fn lock_follows_pushes() {
        let mut ring = ring_of(10, &["A", "B"]);
        ring.block();
        assert_eq!(ring.lock().lock_index(), Some(0));
        ring.push_front(snap("C"));
        ring.push_front(snap("D"));
        assert_eq!(ring.lock().lock_index(), Some(2));
        assert!(!ring.lock().forbids(2));
        assert!(ring.lock().forbids(3));
    }

    #[test]
    fn evicting_locked_snapshot_releases_lock() {
        let mut ring = ring_of(3, &["A", "B", "C"]);
        ring.push_front(snap("X")); // evicts A
        ring.block(); // locks X at 0
        ring.push_front(snap("Y"));
        ring.push_front(snap("Z"));
        assert_eq!(ring.lock().lock_index(), Some(2));
        assert!(ring.lock().is_locked());

        let outcome = ring.push_front(snap("W")); // evicts X
        assert!(outcome.lock_released);
        assert!(!ring.lock().is_locked());
    }

    #[test]
    fn eviction_of_older_snapshot_keeps_lock() {
        let mut ring = ring_of(3, &["A", "B", "C"]);
        ring.block(); // locks C
        let outcome = ring.push_front(snap("D")); // evicts A
        assert!(!outcome.lock_released);
        assert_eq!(ring.lock().lock_index(), Some(1));
    }

    #[test]
    fn discard_front_removes_newest_and_shifts_lock() {
        let mut ring = ring_of(10, &["A", "B"]);
        ring.block(); // locks B
        ring.push_front(snap("C"));
        ring.push_front(snap("D"));

        let outcome = ring.discard_front(2);
        assert_eq!(outcome.discarded, 2);
        assert!(!outcome.lock_released);
        assert_eq!(texts(&ring), vec!["B", "A"]);
        assert_eq!(ring.lock().lock_index(), Some(0));

        let outcome = ring.discard_front(1);
        assert!(outcome.lock_released);
        assert!(!ring.lock().is_locked());
    }

    #[test]
    fn discard_front_clamps_to_len() {
        let mut ring = ring_of(10, &["A", "B"]);
        let outcome = ring.discard_front(5);
        assert_eq!(outcome.discarded, 2);
        assert!(ring.is_empty());
    }

    #[test]
    fn commit_branch_discards_future() {
        let mut ring = ring_of(10, &["A", "B", "C"]);
        ring.set_cursor(Some(2)).unwrap();
        let outcome = ring.commit_branch();
        assert_eq!(outcome.discarded, 2);
        assert_eq!(texts(&ring), vec!["A"]);
        assert_eq!(ring.cursor(), None);
    }

    #[test]
    fn commit_branch_at_index_zero_keeps_everything() {
        let mut ring = ring_of(10, &["A", "B", "C"]);
        ring.set_cursor(Some(0)).unwrap();
        let outcome = ring.commit_branch();
        assert_eq!(outcome.discarded, 0);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.cursor(), None);
    }

    #[test]
    fn commit_branch_from_live_is_noop() {
        let mut ring = ring_of(10, &["A", "B"]);
        assert_eq!(ring.commit_branch(), DiscardOutcome::default());
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn clear_releases_lock() {
        let mut ring = ring_of(10, &["A", "B"]);
        ring.block();
        ring.set_cursor(Some(1)).unwrap();
        assert!(ring.clear());
        assert!(ring.is_empty());
        assert_eq!(ring.cursor(), None);
        assert!(!ring.lock().is_locked());
        assert!(!ring.clear());
    }
}
