//! Capture triggers, branch commits and trigger diagnostics.
//!
//! The host forwards four runtime events to the controller:
//!
//! | host event | controller entry point | effect |
//! |---|---|---|
//! | text fully revealed | [`on_text_revealed`](RollbackController::on_text_revealed) | capture |
//! | choice prompt shown | [`on_choice_shown`](RollbackController::on_choice_shown) | capture |
//! | choice selected | [`on_choice_selected`](RollbackController::on_choice_selected) | branch commit |
//! | advance input | [`on_advance_input`](RollbackController::on_advance_input) | branch commit after a restore |
//!
//! Captures are skipped while a restore is in flight, while no document is
//! loaded, and right after a restore (until the player commits): the pause
//! point a restore lands on is already in the history. For the same reason
//! the first "choice shown" after a choice restore is not captured; the
//! prompt it reports was re-shown by the restore itself.

use std::collections::BTreeMap;

use rewind_history::record::InteractionState;
use rewind_history::ring::DiscardOutcome;
use rewind_history::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::collab::NarrativeRuntime;
use crate::controller::{RollbackController, StepError};

/// Firings of one trigger in one tick above which a loop is suspected.
pub const LOOP_WARNING_THRESHOLD: u32 = 10;

// ---------------------------------------------------------------------------
// Trigger inputs
// ---------------------------------------------------------------------------

/// Runtime events the controller listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTrigger {
    TextRevealed,
    ChoiceShown,
    ChoiceSelected,
    AdvanceInput,
}

/// Payload of the "text fully revealed" notification.
///
/// Carries the text and speaker that were actually revealed. By the time
/// the capture runs, a later event may already have overwritten the
/// runtime's current record, so these values take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealNotice {
    pub text: String,
    pub speaker: Option<String>,
}

impl RevealNotice {
    pub fn new(text: impl Into<String>, speaker: Option<&str>) -> Self {
        Self {
            text: text.into(),
            speaker: speaker.map(str::to_owned),
        }
    }
}

/// What [`RollbackController::on_advance_input`] did with the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceDisposition {
    /// Not awaiting a commit; the runtime handles the input as usual.
    PassThrough,
    /// A restore is in flight; the host must drop the input so the runtime
    /// does not advance from a half-restored position.
    Suppressed,
    /// The branch was committed; the runtime handles the input as usual.
    Committed,
    /// The branch was committed and the controller advanced the runtime,
    /// which was paused in [`InteractionState::Waiting`].
    CommittedAndAdvanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

// ---------------------------------------------------------------------------
// TriggerDiagnostics
// ---------------------------------------------------------------------------

/// Per-tick trigger counts and lifetime totals.
#[derive(Debug, Clone, Default)]
pub struct TriggerDiagnostics {
    this_tick: BTreeMap<CaptureTrigger, u32>,
    /// Snapshots pushed into the history.
    pub captures: u64,
    /// Captures suppressed by a guard.
    pub skipped_captures: u64,
    /// Branch commits performed.
    pub commits: u64,
    /// Snapshots discarded by branch commits.
    pub discarded: u64,
    /// Times a trigger crossed [`LOOP_WARNING_THRESHOLD`] within one tick.
    pub loop_warnings: u64,
}

impl TriggerDiagnostics {
    /// How often `trigger` fired during the current tick.
    pub fn fired_this_tick(&self, trigger: CaptureTrigger) -> u32 {
        self.this_tick.get(&trigger).copied().unwrap_or(0)
    }

    pub(crate) fn start_tick(&mut self) {
        self.this_tick.clear();
    }

    pub(crate) fn record(&mut self, trigger: CaptureTrigger, tick: u64) {
        let count = self.this_tick.entry(trigger).or_insert(0);
        *count += 1;
        if *count == LOOP_WARNING_THRESHOLD + 1 {
            self.loop_warnings += 1;
            warn!(
                ?trigger,
                tick,
                threshold = LOOP_WARNING_THRESHOLD,
                "trigger fired repeatedly within one tick; likely an infinite loop"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Controller entry points
// ---------------------------------------------------------------------------

impl<R: NarrativeRuntime> RollbackController<R> {
    /// The runtime finished revealing a line of text.
    ///
    /// Returns `true` if a snapshot was captured.
    pub fn on_text_revealed(&mut self, notice: &RevealNotice) -> bool {
        self.capture(CaptureTrigger::TextRevealed, Some(notice))
    }

    /// The runtime put a choice prompt on screen.
    ///
    /// Returns `true` if a snapshot was captured.
    pub fn on_choice_shown(&mut self) -> bool {
        self.capture(CaptureTrigger::ChoiceShown, None)
    }

    /// The player picked a choice: discard every snapshot newer than the
    /// one being viewed and return to live.
    pub fn on_choice_selected(&mut self) -> DiscardOutcome {
        let tick = self.tick_count();
        self.diagnostics.record(CaptureTrigger::ChoiceSelected, tick);
        if self.applying {
            trace!("choice selected during restore; ignoring");
            return DiscardOutcome::default();
        }
        self.commit_branch()
    }

    /// The player pressed "advance".
    ///
    /// Right after a restore the first advance commits the branch. If the
    /// runtime was parked in [`InteractionState::Waiting`] the controller
    /// advances it, and on the next tick makes sure a choice event that
    /// follows actually shows its prompt.
    pub fn on_advance_input(&mut self) -> AdvanceDisposition {
        let tick = self.tick_count();
        self.diagnostics.record(CaptureTrigger::AdvanceInput, tick);
        if self.applying {
            trace!("advance input during restore; suppressed");
            return AdvanceDisposition::Suppressed;
        }
        if !self.await_commit {
            return AdvanceDisposition::PassThrough;
        }

        self.commit_branch();
        self.choice_check_due = true;

        if self.collab.runtime.interaction_state() == InteractionState::Waiting {
            debug!("advancing runtime held back by rollback");
            self.collab.runtime.advance();
            AdvanceDisposition::CommittedAndAdvanced
        } else {
            AdvanceDisposition::Committed
        }
    }

    /// Secondary input gesture: scroll up rolls back one step, scroll down
    /// rolls forward one step.
    ///
    /// Returns `None` when the gesture is disabled or a pause/modal state
    /// is active.
    pub fn on_scroll(
        &mut self,
        direction: ScrollDirection,
        modal_active: bool,
    ) -> Option<Result<usize, StepError>> {
        if !self.config.scroll_gesture || modal_active {
            return None;
        }
        Some(match direction {
            ScrollDirection::Up => self.rollback(1),
            ScrollDirection::Down => self.rollforward(1),
        })
    }

    fn capture(&mut self, trigger: CaptureTrigger, notice: Option<&RevealNotice>) -> bool {
        let tick = self.tick_count();
        self.diagnostics.record(trigger, tick);

        let skip_reason = if self.applying {
            Some("restore in flight")
        } else if trigger == CaptureTrigger::ChoiceShown
            && std::mem::take(&mut self.choice_restored)
        {
            Some("prompt re-shown by a choice restore")
        } else if self.collab.runtime.current_document().is_none() {
            Some("no active document")
        } else if self.await_commit {
            Some("awaiting commit after restore")
        } else {
            None
        };
        if let Some(reason) = skip_reason {
            trace!(?trigger, reason, "capture skipped");
            self.diagnostics.skipped_captures += 1;
            return false;
        }

        let mut record = self.collab.runtime.capture_state();
        let stripped = record.strip_volatile();
        if let Some(notice) = notice {
            record.text = notice.text.clone();
            record.speaker = notice.speaker.clone();
        }
        let interaction = match trigger {
            CaptureTrigger::ChoiceShown => InteractionState::AwaitingChoice,
            _ => self.collab.runtime.interaction_state(),
        };
        let layout_history = self
            .collab
            .presentation
            .as_mut()
            .and_then(|presentation| presentation.transcript())
            .map(|transcript| transcript.history());

        let snapshot = Snapshot::new(record, interaction, layout_history);
        debug!(
            ?trigger,
            digest = snapshot.short_digest(),
            stripped,
            len = self.ring.len() + 1,
            "captured snapshot"
        );

        let outcome = self.ring.push_front(snapshot);
        self.diagnostics.captures += 1;
        if outcome.lock_released {
            self.note_lock_released();
        }
        true
    }

    /// Discard the future tail and return to live.
    fn commit_branch(&mut self) -> DiscardOutcome {
        let cursor = self.ring.cursor();
        let outcome = self.ring.commit_branch();
        self.await_commit = false;
        self.choice_restored = false;
        self.diagnostics.commits += 1;
        self.diagnostics.discarded += outcome.discarded as u64;
        if outcome.discarded > 0 {
            debug!(
                ?cursor,
                discarded = outcome.discarded,
                len = self.ring.len(),
                "branch committed; future discarded"
            );
        }
        if outcome.lock_released {
            self.note_lock_released();
        }
        outcome
    }

    /// Show the choice prompt if the current event is a choice whose
    /// widgets never became visible.
    pub(crate) fn reveal_missing_choices(&mut self) {
        if !self.collab.runtime.current_event_is_choice() {
            return;
        }
        let visible = self.collab.subsystems.iter_mut().any(|subsystem| {
            subsystem
                .as_choice_prompt()
                .is_some_and(|choices| choices.choices_visible())
        });
        if visible {
            return;
        }
        debug!("choice event without a visible prompt; forcing reveal");
        for subsystem in self.collab.subsystems.iter_mut() {
            if let Some(choices) = subsystem.as_choice_prompt() {
                choices.show_choices();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
