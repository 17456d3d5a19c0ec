//! Immutable history snapshots with BLAKE3 content digests.
//!
//! A [`Snapshot`] freezes one [`StateRecord`] together with the
//! [`InteractionState`] the runtime was in and, optionally, an opaque
//! [`LayoutHistory`] blob produced by a presentation layer that keeps its own
//! micro-history (for example a chat-style transcript).
//!
//! Fields are private: once a snapshot is built it can only be read. The
//! BLAKE3 digest is computed at construction and covers everything the
//! snapshot holds, which makes "this snapshot was never touched" a cheap
//! check and gives log lines a stable short identifier.
//!
//! ```
//! use rewind_history::prelude::*;
//!
//! let record = StateRecord::at(DocumentRef::new("intro"), 0).with_text("Hello", Some("alice"));
//! let snapshot = Snapshot::new(record, InteractionState::Idle, None);
//!
//! assert_eq!(snapshot.record().text, "Hello");
//! assert_eq!(snapshot.digest().len(), 64);
//! assert!(snapshot.verify());
//! ```

use serde::{Deserialize, Serialize};

use crate::record::{InteractionState, StateRecord};

// ---------------------------------------------------------------------------
// LayoutHistory
// ---------------------------------------------------------------------------

/// Opaque transcript blob owned by a presentation layer.
///
/// The history engine stores and hands it back verbatim. It never looks
/// inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutHistory(pub serde_json::Value);

impl LayoutHistory {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One captured pause point.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    record: StateRecord,
    interaction: InteractionState,
    layout_history: Option<LayoutHistory>,
    digest: String,
}

/// Compute the BLAKE3 hex digest over the hashable snapshot contents.
fn compute_digest(
    record: &StateRecord,
    interaction: InteractionState,
    layout_history: Option<&LayoutHistory>,
) -> String {
    #[derive(Serialize)]
    struct HashableSnapshot<'a> {
        record: &'a StateRecord,
        interaction: InteractionState,
        layout_history: Option<&'a LayoutHistory>,
    }

    let hashable = HashableSnapshot {
        record,
        interaction,
        layout_history,
    };

    // Every field is a string-keyed map or plain data, so serialization
    // cannot fail; an empty byte stream still yields a valid digest.
    let json_bytes = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&json_bytes).to_hex().to_string()
}

impl Snapshot {
    /// Freeze `record` into a snapshot.
    ///
    /// The record is taken by value; callers that keep using their live
    /// record must pass a clone.
    pub fn new(
        record: StateRecord,
        interaction: InteractionState,
        layout_history: Option<LayoutHistory>,
    ) -> Self {
        let digest = compute_digest(&record, interaction, layout_history.as_ref());
        Self {
            record,
            interaction,
            layout_history,
            digest,
        }
    }

    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    pub fn interaction(&self) -> InteractionState {
        self.interaction
    }

    pub fn layout_history(&self) -> Option<&LayoutHistory> {
        self.layout_history.as_ref()
    }

    /// BLAKE3 hex digest (64 lowercase hex chars) of the snapshot contents.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// First 12 hex chars of the digest, for log lines.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12]
    }

    /// Recompute the digest and compare it with the one recorded at
    /// construction.
    pub fn verify(&self) -> bool {
        compute_digest(
            &self.record,
            self.interaction,
            self.layout_history.as_ref(),
        ) == self.digest
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
