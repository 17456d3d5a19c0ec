//! Rollback/rollforward controller and the two-phase restore protocol.
//!
//! The [`RollbackController`] moves a cursor through the
//! [`HistoryRing`] and hands the chosen snapshot back to its collaborators.
//!
//! # States
//!
//! ```text
//!            rollback(n)                 rollback(n) / rollforward(n)
//!   LIVE ─────────────────▶ VIEWING(i) ◀───────────────────────────┐
//!     ▲                        │  └──────────────────────────────────┘
//!     └── capture / commit ────┘
//! ```
//!
//! `APPLYING` is orthogonal to both: it is set for the duration of a restore
//! and every rollback or rollforward requested meanwhile is refused with
//! [`StepError::Busy`]. Requests are never queued.
//!
//! # Restore phases
//!
//! A restore is not atomic. The synchronous part (hide prompts, clear
//! additive displays, replace the state record, restore the layout) runs
//! inside [`rollback`](RollbackController::rollback) /
//! [`rollforward`](RollbackController::rollforward) and parks the restore in
//! [`ApplyPhase::LayoutSettle`]. The host's next
//! [`tick`](RollbackController::tick), once layout geometry has settled,
//! restores content. Text restores park once more in
//! [`ApplyPhase::RevealSettle`] so text widgets can re-measure before
//! `APPLYING` is cleared. No restore spans more than two ticks.
//!
//! # Index 0
//!
//! Index 0 is the newest capture, which is what the player is already
//! looking at while live. Rolling back one step from live therefore lands
//! on index 1, never on index 0.
//!
//! ```
//! use rewind_engine::prelude::*;
//! # use rewind_engine::testing::ScriptedRuntime;
//!
//! let runtime = ScriptedRuntime::new("intro");
//! let mut controller = RollbackController::new(Collaborators::new(runtime), HistoryConfig::default()).unwrap();
//!
//! controller.runtime_mut().say("Hello", Some("alice"));
//! controller.on_text_revealed(&RevealNotice::new("Hello", Some("alice")));
//! controller.runtime_mut().say("World", Some("bob"));
//! controller.on_text_revealed(&RevealNotice::new("World", Some("bob")));
//!
//! assert_eq!(controller.rollback(1), Ok(1));
//! controller.settle();
//! assert_eq!(controller.runtime().live_record().text, "Hello");
//! ```

use rewind_history::lock::LockTransition;
use rewind_history::record::{InteractionState, StateRecord};
use rewind_history::ring::{HistoryRing, RingError};
use rewind_history::snapshot::Snapshot;
use tracing::{debug, trace, warn};

use crate::collab::{Collaborators, NarrativeRuntime, SaveParticipant, TextAnnouncement};
use crate::config::{ConfigError, HistoryConfig};
use crate::events::{EventBus, HistoryEvent, SubscriptionId};
use crate::triggers::TriggerDiagnostics;

/// Upper bound on ticks [`RollbackController::settle`] will drive.
pub const MAX_SETTLE_TICKS: u32 = 4;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Why a rollback or rollforward was refused.
///
/// Refusals never change the cursor or the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// A restore is still in flight.
    #[error("a snapshot restore is already in progress")]
    Busy,

    #[error("step count must be at least 1")]
    ZeroSteps,

    #[error("history is empty")]
    EmptyHistory,

    /// The move would run off the oldest end of the history.
    #[error("target index {target} is outside a history of {len} snapshots")]
    OutOfRange { target: usize, len: usize },

    /// The lock gate forbids reaching `target`.
    #[error("rollback to index {target} is blocked (locked at index {lock_index})")]
    Blocked { target: usize, lock_index: usize },

    /// Rollforward from the live state: there is nothing ahead.
    #[error("not viewing a snapshot; nothing to roll forward to")]
    NotViewing,

    /// Already viewing the newest snapshot; moving further forward means
    /// committing by advancing.
    #[error("already at the newest snapshot")]
    AtNewest,
}

impl StepError {
    /// `true` for refusals caused by the lock gate rather than feasibility.
    pub fn is_policy_refusal(&self) -> bool {
        matches!(self, StepError::Blocked { .. })
    }
}

// ---------------------------------------------------------------------------
// Apply phases
// ---------------------------------------------------------------------------

/// Where a parked restore resumes on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    /// Layout restored; content restores once geometry has settled.
    LayoutSettle,
    /// Text announced; reveal-start notification pending.
    RevealSettle,
}

/// Observable state of the restore protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Idle,
    Pending(ApplyPhase),
}

#[derive(Debug)]
struct PendingApply {
    phase: ApplyPhase,
    snapshot: Snapshot,
    /// The record handed to the runtime (reveal progress stripped).
    record: StateRecord,
}

// ---------------------------------------------------------------------------
// RollbackController
// ---------------------------------------------------------------------------

/// The rollback/rollforward state machine.
pub struct RollbackController<R> {
    pub(crate) ring: HistoryRing,
    pub(crate) config: HistoryConfig,
    pub(crate) collab: Collaborators<R>,
    pub(crate) events: EventBus,
    pub(crate) diagnostics: TriggerDiagnostics,
    /// Re-entrancy guard, set while a restore is in flight.
    pub(crate) applying: bool,
    /// The next advance input commits instead of capturing.
    pub(crate) await_commit: bool,
    /// Set by the post-restore advance path; checked on the next tick.
    pub(crate) choice_check_due: bool,
    /// A choice restore re-showed the prompt; the host's echo of that
    /// "choice shown" event is not a new pause point.
    pub(crate) choice_restored: bool,
    pending: Option<PendingApply>,
    tick_count: u64,
}

impl<R: NarrativeRuntime> RollbackController<R> {
    /// Create a controller with an empty history.
    pub fn new(collaborators: Collaborators<R>, config: HistoryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ring = HistoryRing::new(config.max_size).map_err(|_| ConfigError::ZeroCapacity)?;
        Ok(Self {
            ring,
            config,
            collab: collaborators,
            events: EventBus::new(),
            diagnostics: TriggerDiagnostics::default(),
            applying: false,
            await_commit: false,
            choice_check_due: false,
            choice_restored: false,
            pending: None,
            tick_count: 0,
        })
    }

    // -- movement -----------------------------------------------------------

    /// Roll back `steps` snapshots.
    ///
    /// From live the target is index `steps`; while viewing index `i` it is
    /// `i + steps`. On success the cursor moves, the restore begins and
    /// [`HistoryEvent::RollbackPerformed`] is emitted. Returns the target
    /// index.
    pub fn rollback(&mut self, steps: usize) -> Result<usize, StepError> {
        let target = match self.rollback_target(steps) {
            Ok(target) => target,
            Err(error) => {
                if error.is_policy_refusal() {
                    debug!(steps, %error, "rollback refused by lock");
                    self.events.emit(HistoryEvent::RollbackBlocked);
                } else {
                    trace!(steps, %error, "rollback refused");
                }
                return Err(error);
            }
        };

        self.move_cursor(target)?;
        self.begin_apply(target);
        self.events.emit(HistoryEvent::RollbackPerformed { steps });
        Ok(target)
    }

    /// Roll forward `steps` snapshots toward the newest capture.
    ///
    /// Only valid while viewing an index above 0. The target saturates at
    /// index 0. Returns the target index.
    pub fn rollforward(&mut self, steps: usize) -> Result<usize, StepError> {
        let target = match self.rollforward_target(steps) {
            Ok(target) => target,
            Err(error) => {
                trace!(steps, %error, "rollforward refused");
                return Err(error);
            }
        };

        self.move_cursor(target)?;
        self.begin_apply(target);
        self.events.emit(HistoryEvent::RollforwardPerformed { steps });
        Ok(target)
    }

    /// Whether a one-step rollback would currently succeed.
    pub fn can_rollback(&self) -> bool {
        self.rollback_target(1).is_ok()
    }

    /// Whether a one-step rollforward would currently succeed.
    pub fn can_rollforward(&self) -> bool {
        self.rollforward_target(1).is_ok()
    }

    /// Cursor position normalized over the history, `0.0` at the newest
    /// snapshot and `1.0` at the oldest. `0.0` while live or when the
    /// history holds at most one snapshot.
    pub fn progress_fraction(&self) -> f32 {
        match self.ring.cursor() {
            Some(index) if self.ring.len() > 1 => index as f32 / (self.ring.len() - 1) as f32,
            _ => 0.0,
        }
    }

    fn rollback_target(&self, steps: usize) -> Result<usize, StepError> {
        if self.applying {
            return Err(StepError::Busy);
        }
        if steps == 0 {
            return Err(StepError::ZeroSteps);
        }
        if self.ring.is_empty() {
            return Err(StepError::EmptyHistory);
        }
        let target = match self.ring.cursor() {
            None => steps,
            Some(index) => index.saturating_add(steps),
        };
        if target >= self.ring.len() {
            return Err(StepError::OutOfRange {
                target,
                len: self.ring.len(),
            });
        }
        if self.ring.lock().forbids(target) {
            return Err(StepError::Blocked {
                target,
                lock_index: self.ring.lock().lock_index().unwrap_or_default(),
            });
        }
        Ok(target)
    }

    fn rollforward_target(&self, steps: usize) -> Result<usize, StepError> {
        if self.applying {
            return Err(StepError::Busy);
        }
        if steps == 0 {
            return Err(StepError::ZeroSteps);
        }
        match self.ring.cursor() {
            None => Err(StepError::NotViewing),
            Some(0) => Err(StepError::AtNewest),
            Some(index) => Ok(index.saturating_sub(steps)),
        }
    }

    fn move_cursor(&mut self, target: usize) -> Result<(), StepError> {
        self.ring.set_cursor(Some(target)).map_err(|error| match error {
            RingError::CursorOutOfRange { index, len } => StepError::OutOfRange { target: index, len },
            RingError::ZeroCapacity => StepError::EmptyHistory,
        })
    }

    // -- restore protocol ---------------------------------------------------

    /// Synchronous half of a restore: everything up to the layout restore.
    fn begin_apply(&mut self, target: usize) {
        let Some(snapshot) = self.ring.get(target).cloned() else {
            return;
        };
        self.applying = true;
        self.choice_restored = false;
        debug!(
            index = target,
            len = self.ring.len(),
            digest = snapshot.short_digest(),
            interaction = ?snapshot.interaction(),
            "applying snapshot"
        );

        self.collab.runtime.cancel_event_hooks();

        for subsystem in self.collab.subsystems.iter_mut() {
            if let Some(choices) = subsystem.as_choice_prompt() {
                choices.hide_choices();
                choices.cancel_reveal_timers();
            }
        }
        for subsystem in self.collab.subsystems.iter_mut() {
            if let Some(display) = subsystem.as_additive_display() {
                display.clear_all();
            }
        }

        let mut record = snapshot.record().clone();
        record.strip_reveal_progress();
        self.collab.runtime.replace_state_record(record.clone());

        match self.collab.presentation.as_mut() {
            Some(presentation) => {
                if let Err(error) = presentation.restore_layout(&record) {
                    warn!(%error, "layout restore failed; continuing with current layout");
                }
            }
            None => trace!("no presentation collaborator; skipping layout restore"),
        }

        self.pending = Some(PendingApply {
            phase: ApplyPhase::LayoutSettle,
            snapshot,
            record,
        });
    }

    /// Second half of a restore, after layout has settled.
    fn resume_after_layout(&mut self, snapshot: Snapshot, record: StateRecord) {
        let transcript = self
            .collab
            .presentation
            .as_mut()
            .and_then(|presentation| presentation.transcript());
        let transcript_replayed = match (snapshot.layout_history(), transcript) {
            (Some(history), Some(transcript)) => {
                transcript.clear_history();
                if let Err(error) = transcript.replay_history(history) {
                    warn!(%error, "transcript replay failed; transcript left cleared");
                }
                true
            }
            (Some(_), None) => {
                debug!("snapshot carries a transcript but the presentation cannot replay it");
                false
            }
            (None, _) => false,
        };

        for subsystem in self.collab.subsystems.iter_mut() {
            if transcript_replayed && subsystem.as_text_display().is_some() {
                trace!(subsystem = subsystem.name(), "text restored by transcript; skipping");
                continue;
            }
            if let Err(error) = subsystem.restore(&record) {
                warn!(subsystem = subsystem.name(), %error, "subsystem restore failed; continuing");
            }
        }

        match record.document.clone() {
            Some(document) => {
                if self.collab.runtime.current_document().as_ref() != Some(&document) {
                    if let Err(error) = self.collab.runtime.load_document(&document) {
                        warn!(%document, %error, "failed to load snapshot document");
                    }
                }
                self.collab.runtime.set_position(document, record.event_index);
            }
            None => warn!("snapshot has no document; runtime position left unchanged"),
        }

        if snapshot.interaction().is_awaiting_choice() {
            self.collab
                .runtime
                .set_interaction_state(InteractionState::AwaitingChoice);
            for subsystem in self.collab.subsystems.iter_mut() {
                if let Some(choices) = subsystem.as_choice_prompt() {
                    choices.show_choices();
                }
            }
            self.applying = false;
            self.await_commit = false;
            self.choice_restored = true;
            debug!(digest = snapshot.short_digest(), "restored choice prompt");
            return;
        }

        if record.text.is_empty() {
            for subsystem in self.collab.subsystems.iter_mut() {
                if let Some(text) = subsystem.as_text_display() {
                    text.hide_transient_bubbles();
                }
            }
            self.finish_apply();
            return;
        }

        let speaker = record.speaker.as_deref().and_then(|reference| {
            let resolved = self.collab.runtime.resolve_speaker(reference);
            if resolved.is_none() {
                warn!(speaker = reference, "speaker could not be resolved; restoring without portrait");
            }
            resolved
        });
        self.collab.runtime.announce_text(TextAnnouncement {
            text: record.text.clone(),
            speaker,
        });

        self.pending = Some(PendingApply {
            phase: ApplyPhase::RevealSettle,
            snapshot,
            record,
        });
    }

    fn finish_reveal(&mut self) {
        for subsystem in self.collab.subsystems.iter_mut() {
            if let Some(text) = subsystem.as_text_display() {
                text.reveal_started();
            }
        }
        self.finish_apply();
    }

    fn finish_apply(&mut self) {
        self.applying = false;
        self.await_commit = true;
        if self.collab.has_transcript() {
            self.collab
                .runtime
                .set_interaction_state(InteractionState::Waiting);
        }
        debug!(cursor = ?self.ring.cursor(), "snapshot applied; awaiting commit");
    }

    // -- scheduling ---------------------------------------------------------

    /// Advance one scheduling frame.
    ///
    /// Resets per-tick trigger counters, runs a due choice check and resumes
    /// a parked restore. Returns the restore status after this tick.
    pub fn tick(&mut self) -> ApplyStatus {
        self.tick_count += 1;
        self.diagnostics.start_tick();

        if std::mem::take(&mut self.choice_check_due) {
            self.reveal_missing_choices();
        }

        if let Some(pending) = self.pending.take() {
            match pending.phase {
                ApplyPhase::LayoutSettle => self.resume_after_layout(pending.snapshot, pending.record),
                ApplyPhase::RevealSettle => self.finish_reveal(),
            }
        }

        self.apply_status()
    }

    /// Tick until no restore is pending. Returns the number of ticks run.
    pub fn settle(&mut self) -> u32 {
        let mut ticks = 0;
        while self.pending.is_some() && ticks < MAX_SETTLE_TICKS {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    pub fn apply_status(&self) -> ApplyStatus {
        match &self.pending {
            Some(pending) => ApplyStatus::Pending(pending.phase),
            None => ApplyStatus::Idle,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // -- lock ---------------------------------------------------------------

    /// Forbid rolling back past the newest capture.
    pub fn block(&mut self) {
        let transition = self.ring.block();
        debug!(lock_index = ?self.ring.lock().lock_index(), "rollback blocked");
        self.emit_lock(transition);
    }

    pub fn unblock(&mut self) {
        let transition = self.ring.unblock();
        debug!("rollback unblocked");
        self.emit_lock(transition);
    }

    /// Whether a block is in effect. A block issued while the history was
    /// empty reports `true` without forbidding anything until
    /// [`unblock`](Self::unblock).
    pub fn is_locked(&self) -> bool {
        self.ring.lock().is_locked()
    }

    fn emit_lock(&mut self, transition: LockTransition) {
        let event = match transition {
            LockTransition::Blocked => HistoryEvent::RollbackBlocked,
            LockTransition::Unblocked => HistoryEvent::RollbackUnblocked,
        };
        self.events.emit(event);
    }

    /// Report a lock released because its snapshot left the history.
    pub(crate) fn note_lock_released(&mut self) {
        debug!("locked snapshot left the history; lock released");
        self.events.emit(HistoryEvent::RollbackUnblocked);
    }

    // -- history management -------------------------------------------------

    /// Drop the whole history (a new story or session is starting).
    pub fn clear_history(&mut self) -> Result<(), StepError> {
        if self.applying {
            return Err(StepError::Busy);
        }
        let released = self.ring.clear();
        self.await_commit = false;
        self.choice_check_due = false;
        self.choice_restored = false;
        if released {
            self.events.emit(HistoryEvent::RollbackUnblocked);
        }
        debug!("history cleared");
        Ok(())
    }

    /// Replace the configuration. A new `max_size` takes effect at the next
    /// capture; existing overflow is not trimmed.
    pub fn set_config(&mut self, config: HistoryConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.ring
            .set_capacity(config.max_size)
            .map_err(|_| ConfigError::ZeroCapacity)?;
        self.config = config;
        Ok(())
    }

    // -- observers ----------------------------------------------------------

    pub fn subscribe(&mut self, observer: impl FnMut(&HistoryEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // -- accessors ----------------------------------------------------------

    /// Read-only view of the history.
    pub fn history(&self) -> &HistoryRing {
        &self.ring
    }

    pub fn cursor(&self) -> Option<usize> {
        self.ring.cursor()
    }

    pub fn is_applying(&self) -> bool {
        self.applying
    }

    pub fn is_awaiting_commit(&self) -> bool {
        self.await_commit
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &TriggerDiagnostics {
        &self.diagnostics
    }

    pub fn runtime(&self) -> &R {
        &self.collab.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.collab.runtime
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Rollback history is session-scoped and never written into a save.
impl<R: NarrativeRuntime> SaveParticipant for RollbackController<R> {
    fn save_state(&self) -> Option<serde_json::Value> {
        trace!("rollback history is not saved");
        None
    }

    fn load_state(&mut self, _state: Option<&serde_json::Value>) {
        trace!("rollback history is not loaded");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
