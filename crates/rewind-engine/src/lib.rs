//! Rewind Engine -- rollback/rollforward controller for a narrative runtime.
//!
//! This crate builds on [`rewind_history`] to provide the session-scoped
//! history engine: capture triggers that record snapshots while the player
//! reads, a controller that moves through them on request, and the
//! two-phase restore protocol that hands a snapshot back to the runtime and
//! its presentation collaborators.
//!
//! # Quick Start
//!
//! ```
//! use rewind_engine::prelude::*;
//! use rewind_engine::testing::{call_log, ScriptedRuntime, TextWidget};
//!
//! let log = call_log();
//! let collaborators = Collaborators::new(ScriptedRuntime::with_log("intro", log.clone()))
//!     .with_subsystem(TextWidget::new(log.clone()));
//! let mut controller = RollbackController::new(collaborators, HistoryConfig::default()).unwrap();
//!
//! for line in ["Hello", "World"] {
//!     controller.runtime_mut().say(line, None);
//!     controller.on_text_revealed(&RevealNotice::new(line, None));
//! }
//!
//! controller.rollback(1).unwrap();
//! assert_eq!(controller.settle(), 2);
//! assert_eq!(controller.runtime().announcements()[0].text, "Hello");
//!
//! // The first advance after a restore commits the branch.
//! assert_eq!(controller.on_advance_input(), AdvanceDisposition::Committed);
//! assert_eq!(controller.history().len(), 1);
//! ```

#![deny(unsafe_code)]

pub mod collab;
pub mod config;
pub mod controller;
pub mod events;
pub mod logging;
pub mod marker;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod triggers;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the history crate for convenience.
pub use rewind_history;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::collab::{
        AdditiveDisplay, ChoicePrompt, Collaborators, NarrativeRuntime, Presentation,
        SaveParticipant, SpeakerInfo, Subsystem, TextAnnouncement, TextDisplay, TranscriptHistory,
    };
    pub use crate::config::{ConfigError, HistoryConfig};
    pub use crate::controller::{ApplyPhase, ApplyStatus, RollbackController, StepError};
    pub use crate::events::{HistoryEvent, SubscriptionId};
    pub use crate::marker::{HistoryMarker, MarkerCompletion};
    pub use crate::triggers::{
        AdvanceDisposition, CaptureTrigger, RevealNotice, ScrollDirection, TriggerDiagnostics,
    };
    pub use rewind_history::prelude::*;
}
