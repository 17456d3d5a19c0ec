//! Collaborator interfaces the controller drives during capture and restore.
//!
//! The controller never reaches for a global runtime object. Everything it
//! talks to is injected through [`Collaborators`] at construction:
//!
//! - exactly one [`NarrativeRuntime`] (the dialogue runtime and capture
//!   source);
//! - an optional [`Presentation`] (the active layout), which may expose the
//!   [`TranscriptHistory`] capability;
//! - any number of [`Subsystem`]s (text, choices, portraits, audio,
//!   variables...), each declaring the capabilities it supports.
//!
//! # Capabilities
//!
//! Restore steps that only some collaborators care about are expressed as
//! narrow capability traits. A collaborator opts in by overriding the
//! matching `as_*` accessor; the default returns `None` and the controller
//! skips it.
//!
//! | capability | used for |
//! |---|---|
//! | [`ChoicePrompt`] | hiding prompts before a restore, re-showing them after |
//! | [`AdditiveDisplay`] | clearing portraits/audio whose restore only adds |
//! | [`TextDisplay`] | reveal restart notification, transient bubble cleanup |
//! | [`TranscriptHistory`] | verbatim transcript capture and replay |

use rewind_history::record::{DocumentRef, InteractionState, StateRecord};
use rewind_history::snapshot::LayoutHistory;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Speaker metadata resolved from a snapshot's speaker reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    /// The reference stored in the record.
    pub id: String,
    pub display_name: String,
    /// Portrait to show next to the text, if the speaker has one.
    pub portrait: Option<String>,
}

/// "Text is about to be (re)shown", sent to the runtime during a restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnnouncement {
    pub text: String,
    /// `None` when the text has no speaker or the speaker could not be
    /// resolved.
    pub speaker: Option<SpeakerInfo>,
}

/// The dialogue runtime: capture source, document owner and event loop.
pub trait NarrativeRuntime {
    /// Capture the full interaction state as an owned record.
    fn capture_state(&self) -> StateRecord;

    /// Replace the runtime's current interaction-state record.
    fn replace_state_record(&mut self, record: StateRecord);

    fn interaction_state(&self) -> InteractionState;

    fn set_interaction_state(&mut self, state: InteractionState);

    /// The currently loaded document, if any.
    fn current_document(&self) -> Option<DocumentRef>;

    /// Load and link `document` so it can become the active one.
    fn load_document(&mut self, document: &DocumentRef) -> anyhow::Result<()>;

    /// Make `document` active and move the event cursor to `event_index`.
    fn set_position(&mut self, document: DocumentRef, event_index: usize);

    /// Detach handlers still attached to the previously running event.
    fn cancel_event_hooks(&mut self);

    /// Advance to the next event.
    fn advance(&mut self);

    /// Whether the event under the cursor is a choice.
    fn current_event_is_choice(&self) -> bool;

    fn resolve_speaker(&self, speaker: &str) -> Option<SpeakerInfo>;

    fn announce_text(&mut self, announcement: TextAnnouncement);
}

// ---------------------------------------------------------------------------
// Subsystems and capabilities
// ---------------------------------------------------------------------------

/// Choice prompt widgets.
pub trait ChoicePrompt {
    fn hide_choices(&mut self);
    /// Cancel pending reveal timers and listeners tied to the prompt.
    fn cancel_reveal_timers(&mut self);
    fn show_choices(&mut self);
    fn choices_visible(&self) -> bool;
}

/// A display whose restore only adds or updates elements, so stale ones
/// must be cleared first (portraits, audio channels).
pub trait AdditiveDisplay {
    fn clear_all(&mut self);
}

/// Plain text display widgets.
pub trait TextDisplay {
    /// The text reveal (re)started; widgets should re-measure their layout.
    fn reveal_started(&mut self);
    /// Hide transient dialogue bubbles left over from a previous event.
    fn hide_transient_bubbles(&mut self);
}

/// A runtime subsystem with restorable state.
pub trait Subsystem {
    fn name(&self) -> &str;

    /// Restore this subsystem's state from the shared interaction record.
    fn restore(&mut self, record: &StateRecord) -> anyhow::Result<()>;

    fn as_choice_prompt(&mut self) -> Option<&mut dyn ChoicePrompt> {
        None
    }

    fn as_additive_display(&mut self) -> Option<&mut dyn AdditiveDisplay> {
        None
    }

    fn as_text_display(&mut self) -> Option<&mut dyn TextDisplay> {
        None
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// A presentation layer that keeps its own transcript micro-history.
pub trait TranscriptHistory {
    fn history(&self) -> LayoutHistory;
    fn clear_history(&mut self);
    fn replay_history(&mut self, history: &LayoutHistory) -> anyhow::Result<()>;
}

/// The active layout.
pub trait Presentation {
    /// Restore styles and layout. Runs before any content is restored.
    fn restore_layout(&mut self, record: &StateRecord) -> anyhow::Result<()>;

    fn transcript(&mut self) -> Option<&mut dyn TranscriptHistory> {
        None
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Participation in the host's save/load payload.
pub trait SaveParticipant {
    fn save_state(&self) -> Option<serde_json::Value>;
    fn load_state(&mut self, state: Option<&serde_json::Value>);
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything the controller drives, injected at construction.
pub struct Collaborators<R> {
    pub runtime: R,
    pub presentation: Option<Box<dyn Presentation>>,
    pub subsystems: Vec<Box<dyn Subsystem>>,
}

impl<R: NarrativeRuntime> Collaborators<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            presentation: None,
            subsystems: Vec::new(),
        }
    }

    pub fn with_presentation(mut self, presentation: impl Presentation + 'static) -> Self {
        self.presentation = Some(Box::new(presentation));
        self
    }

    /// Register a subsystem. Subsystems restore in registration order.
    pub fn with_subsystem(mut self, subsystem: impl Subsystem + 'static) -> Self {
        self.subsystems.push(Box::new(subsystem));
        self
    }

    /// Whether the active presentation keeps a transcript.
    pub fn has_transcript(&mut self) -> bool {
        self.presentation
            .as_mut()
            .is_some_and(|presentation| presentation.transcript().is_some())
    }
}
