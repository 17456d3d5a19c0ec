//! Rewind History -- bounded snapshot history for narrative rollback.
//!
//! This crate holds the leaf data structures of the Rewind rollback engine.
//! It knows nothing about the narrative runtime or its presentation layers;
//! it only stores what they captured and keeps the bookkeeping consistent.
//!
//! # Modules
//!
//! - [`record`]: the typed, versioned interaction-state record and the
//!   interaction-state tag.
//! - [`snapshot`]: immutable snapshots with BLAKE3 digests.
//! - [`lock`]: the author-placed lock gate.
//! - [`ring`]: the bounded newest-first ring with its cursor.
//!
//! # Quick Start
//!
//! ```
//! use rewind_history::prelude::*;
//!
//! let mut ring = HistoryRing::new(100).unwrap();
//! for (index, text) in ["Hello", "World"].into_iter().enumerate() {
//!     let record = StateRecord::at(DocumentRef::new("intro"), index).with_text(text, None);
//!     ring.push_front(Snapshot::new(record, InteractionState::Idle, None));
//! }
//!
//! // Index 0 is the newest capture.
//! assert_eq!(ring.get(0).unwrap().record().text, "World");
//! assert_eq!(ring.get(1).unwrap().record().text, "Hello");
//! ```

#![deny(unsafe_code)]

pub mod lock;
pub mod record;
pub mod ring;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::lock::{LockGate, LockTransition};
    pub use crate::record::{
        DocumentRef, FieldValue, InteractionState, NodeHandle, StateRecord, STATE_RECORD_VERSION,
    };
    pub use crate::ring::{DiscardOutcome, HistoryRing, PushOutcome, RingError, DEFAULT_CAPACITY};
    pub use crate::snapshot::{LayoutHistory, Snapshot};
}
