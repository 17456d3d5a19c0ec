//! Typed interaction-state record captured from the narrative runtime.
//!
//! A [`StateRecord`] is the value the runtime hands over when the history
//! engine asks for a "full state capture", and the value it receives back when
//! a snapshot is restored. Well-known fields (document, event cursor, text,
//! speaker, reveal progress) are typed; everything a collaborator subsystem
//! wants to persist lives in [`StateRecord::fields`], keyed by subsystem name.
//!
//! Records are versioned and every optional field is `#[serde(default)]`, so
//! a record written by an older or newer runtime still deserializes.
//!
//! # Volatile fields
//!
//! Collaborators occasionally store references to live runtime objects (scene
//! nodes, audio players) next to their plain data. Those are modelled as
//! [`FieldValue::Handle`] and removed by [`StateRecord::strip_volatile`]
//! before the record is frozen into a snapshot: a snapshot must never hold a
//! reference that can dangle once the runtime moves on.
//!
//! ```
//! use rewind_history::record::{FieldValue, NodeHandle, StateRecord};
//!
//! let mut record = StateRecord::default();
//! record.set_field("portraits", FieldValue::Data(serde_json::json!({"left": "alice"})));
//! record.set_field("portrait_node", FieldValue::Handle(NodeHandle(42)));
//!
//! assert_eq!(record.strip_volatile(), 1);
//! assert!(record.field("portrait_node").is_none());
//! assert!(record.field("portraits").is_some());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Current [`StateRecord`] layout version.
pub const STATE_RECORD_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// DocumentRef
// ---------------------------------------------------------------------------

/// Identifies a narrative document (timeline) the runtime can load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef(pub String);

impl DocumentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// InteractionState
// ---------------------------------------------------------------------------

/// What the runtime is doing (or waiting for) at a given moment.
///
/// Captured alongside every snapshot so that a restore can put the
/// controller back into the right mode: a snapshot taken while a choice
/// prompt was up must come back as a choice prompt, not as clickable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Idle,
    RevealingText,
    Animating,
    AwaitingChoice,
    /// Paused because a rollback suppressed the runtime's auto-advance.
    Waiting,
    WaitingInput,
}

impl InteractionState {
    pub fn is_awaiting_choice(self) -> bool {
        matches!(self, InteractionState::AwaitingChoice)
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// Opaque reference to a live runtime object (scene node, player, widget).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

/// One collaborator-owned entry in a [`StateRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain data, safe to keep in history indefinitely.
    Data(serde_json::Value),
    /// A reference into the live runtime. Never survives into a snapshot.
    Handle(NodeHandle),
}

impl FieldValue {
    pub fn is_volatile(&self) -> bool {
        matches!(self, FieldValue::Handle(_))
    }

    /// The plain data, if this is a [`FieldValue::Data`] entry.
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Data(value) => Some(value),
            FieldValue::Handle(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StateRecord
// ---------------------------------------------------------------------------

/// The runtime's interaction-state record.
///
/// This is an owned value: cloning it is a deep copy, so a record captured
/// into history cannot alias the runtime's live record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Layout version of this record.
    #[serde(default = "default_version")]
    pub version: u32,
    /// The active document, if any is loaded.
    #[serde(default)]
    pub document: Option<DocumentRef>,
    /// Index of the current event within `document`.
    #[serde(default)]
    pub event_index: usize,
    /// Text of the current textual event (empty when none).
    #[serde(default)]
    pub text: String,
    /// Speaker reference of the current textual event.
    #[serde(default)]
    pub speaker: Option<String>,
    /// How far the text reveal had progressed, in `[0, 1]`.
    #[serde(default)]
    pub reveal_progress: Option<f32>,
    /// Per-collaborator sub-records, keyed by collaborator name.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

fn default_version() -> u32 {
    STATE_RECORD_VERSION
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            version: STATE_RECORD_VERSION,
            document: None,
            event_index: 0,
            text: String::new(),
            speaker: None,
            reveal_progress: None,
            fields: BTreeMap::new(),
        }
    }
}

impl StateRecord {
    /// Create an empty record positioned at `event_index` of `document`.
    pub fn at(document: DocumentRef, event_index: usize) -> Self {
        Self {
            document: Some(document),
            event_index,
            ..Default::default()
        }
    }

    /// Builder-style helper setting `text` and `speaker`.
    pub fn with_text(mut self, text: impl Into<String>, speaker: Option<&str>) -> Self {
        self.text = text.into();
        self.speaker = speaker.map(str::to_owned);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Remove every [`FieldValue::Handle`] entry. Returns how many were removed.
    pub fn strip_volatile(&mut self) -> usize {
        let before = self.fields.len();
        self.fields.retain(|_, value| !value.is_volatile());
        before - self.fields.len()
    }

    /// Forget how far the text reveal had progressed so it restarts cleanly.
    pub fn strip_reveal_progress(&mut self) {
        self.reveal_progress = None;
    }

    /// `true` if any field still references the live runtime.
    pub fn has_volatile(&self) -> bool {
        self.fields.values().any(FieldValue::is_volatile)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_has_current_version() {
        let record = StateRecord::default();
        assert_eq!(record.version, STATE_RECORD_VERSION);
        assert!(record.document.is_none());
        assert!(record.text.is_empty());
    }

    #[test]
    fn strip_volatile_removes_only_handles() {
        let mut record = StateRecord::at(DocumentRef::new("intro"), 3);
        record.set_field("audio", FieldValue::Data(serde_json::json!({"music": "theme"})));
        record.set_field("audio_player", FieldValue::Handle(NodeHandle(7)));
        record.set_field("bubble", FieldValue::Handle(NodeHandle(8)));

        assert!(record.has_volatile());
        assert_eq!(record.strip_volatile(), 2);
        assert!(!record.has_volatile());
        assert_eq!(record.fields.len(), 1);
        assert_eq!(
            record.field("audio").and_then(FieldValue::as_data),
            Some(&serde_json::json!({"music": "theme"}))
        );
    }

    #[test]
    fn strip_reveal_progress_clears_progress() {
        let mut record = StateRecord::default().with_text("Hello", Some("alice"));
        record.reveal_progress = Some(0.4);
        record.strip_reveal_progress();
        assert_eq!(record.reveal_progress, None);
        assert_eq!(record.text, "Hello");
    }

    #[test]
    fn clone_is_deep() {
        let mut live = StateRecord::default().with_text("Hello", Some("alice"));
        live.set_field("vars", FieldValue::Data(serde_json::json!({"gold": 5})));
        let captured = live.clone();

        live.text.push_str(" again");
        live.set_field("vars", FieldValue::Data(serde_json::json!({"gold": 9})));

        assert_eq!(captured.text, "Hello");
        assert_eq!(
            captured.field("vars").and_then(FieldValue::as_data),
            Some(&serde_json::json!({"gold": 5}))
        );
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let record: StateRecord =
            serde_json::from_str(r#"{"document": "chapter_1", "event_index": 4}"#).unwrap();
        assert_eq!(record.version, STATE_RECORD_VERSION);
        assert_eq!(record.document, Some(DocumentRef::new("chapter_1")));
        assert_eq!(record.event_index, 4);
        assert!(record.fields.is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record: StateRecord =
            serde_json::from_str(r#"{"version": 2, "text": "hi", "future_field": true}"#).unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.text, "hi");
    }

    #[test]
    fn interaction_state_serializes_snake_case() {
        let json = serde_json::to_string(&InteractionState::AwaitingChoice).unwrap();
        assert_eq!(json, r#""awaiting_choice""#);
        assert!(InteractionState::AwaitingChoice.is_awaiting_choice());
        assert!(!InteractionState::Waiting.is_awaiting_choice());
    }
}
