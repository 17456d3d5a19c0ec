//! Integration tests for the two-phase restore protocol.
//!
//! Every scripted collaborator writes to one shared call log, so these tests
//! pin down the order in which a restore touches the runtime, the layout and
//! each subsystem.

use std::cell::Cell;
use std::rc::Rc;

use rewind_engine::prelude::*;
use rewind_engine::testing::{
    call_log, AdditiveLayer, CallLog, ChoiceWidget, ScriptedLayout, ScriptedRuntime, TextWidget,
};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

struct Stage {
    controller: RollbackController<ScriptedRuntime>,
    log: CallLog,
    choices_visible: Rc<Cell<bool>>,
    transcript: Option<Rc<std::cell::RefCell<Vec<String>>>>,
}

impl Stage {
    fn new() -> Self {
        let log = call_log();
        Self::build(log.clone(), ScriptedLayout::new(log))
    }

    fn with_transcript() -> Self {
        let log = call_log();
        Self::build(log.clone(), ScriptedLayout::with_transcript(log))
    }

    fn build(log: CallLog, layout: ScriptedLayout) -> Self {
        let mut runtime = ScriptedRuntime::with_log("intro", log.clone());
        runtime.add_speaker("alice", "Alice", Some("alice.png"));
        let choices = ChoiceWidget::new(log.clone());
        let choices_visible = choices.visibility();
        let transcript = layout.transcript_lines();

        let collaborators = Collaborators::new(runtime)
            .with_presentation(layout)
            .with_subsystem(TextWidget::new(log.clone()))
            .with_subsystem(choices)
            .with_subsystem(AdditiveLayer::new("portraits", log.clone()));
        let controller = RollbackController::new(collaborators, HistoryConfig::default()).unwrap();

        Self {
            controller,
            log,
            choices_visible,
            transcript,
        }
    }

    fn say(&mut self, text: &str, speaker: Option<&str>) {
        if let Some(transcript) = &self.transcript {
            transcript.borrow_mut().push(text.to_owned());
        }
        self.controller.runtime_mut().say(text, speaker);
        self.controller
            .on_text_revealed(&RevealNotice::new(text, speaker));
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

// ---------------------------------------------------------------------------
// Step order
// ---------------------------------------------------------------------------

#[test]
fn text_restore_runs_steps_in_order() {
    let mut stage = Stage::new();
    stage
        .controller
        .runtime_mut()
        .set_field("portraits", serde_json::json!("alice.png"));
    stage.say("Hello", Some("alice"));
    stage.say("World", None);
    stage.take_log();

    stage.controller.rollback(1).unwrap();
    assert_eq!(
        stage.take_log(),
        vec![
            "runtime.cancel_hooks",
            "choices.hide",
            "choices.cancel_timers",
            "portraits.clear",
            "runtime.replace_record",
            "layout.restore",
        ]
    );

    assert_eq!(
        stage.controller.tick(),
        ApplyStatus::Pending(ApplyPhase::RevealSettle)
    );
    assert_eq!(
        stage.take_log(),
        vec![
            "text.restore:Hello",
            "choices.restore",
            "portraits.restore",
            "portraits.show:\"alice.png\"",
            "runtime.set_position:intro@1",
            "runtime.announce:Hello",
        ]
    );

    assert_eq!(stage.controller.tick(), ApplyStatus::Idle);
    assert_eq!(stage.take_log(), vec!["text.reveal_started"]);
    assert!(!stage.controller.is_applying());
    assert!(stage.controller.is_awaiting_commit());
}

#[test]
fn empty_text_restore_hides_bubbles_and_finishes_in_one_tick() {
    let mut stage = Stage::new();
    stage.say("", None);
    stage.say("Later", None);
    stage.take_log();

    stage.controller.rollback(1).unwrap();
    assert_eq!(stage.controller.tick(), ApplyStatus::Idle);
    let log = stage.take_log();
    assert!(log.contains(&"text.hide_bubbles".to_owned()));
    assert!(!log.iter().any(|entry| entry.starts_with("runtime.announce")));
    assert!(stage.controller.is_awaiting_commit());
}

#[test]
fn unresolved_speaker_restores_without_portrait() {
    let mut stage = Stage::new();
    stage.say("Who said that?", Some("ghost"));
    stage.say("Not me", Some("alice"));

    stage.controller.rollback(1).unwrap();
    stage.controller.settle();
    let announced = stage.controller.runtime().announcements().last().unwrap();
    assert_eq!(announced.text, "Who said that?");
    assert_eq!(announced.speaker, None);
}

#[test]
fn failing_subsystem_does_not_abort_restore() {
    let log = call_log();
    let collaborators = Collaborators::new(ScriptedRuntime::with_log("intro", log.clone()))
        .with_subsystem(AdditiveLayer::failing("audio", log.clone()))
        .with_subsystem(TextWidget::new(log.clone()));
    let mut controller = RollbackController::new(collaborators, HistoryConfig::default()).unwrap();
    for line in ["A", "B"] {
        controller.runtime_mut().say(line, None);
        controller.on_text_revealed(&RevealNotice::new(line, None));
    }

    controller.rollback(1).unwrap();
    assert_eq!(controller.settle(), 2);
    let log = log.borrow();
    assert!(log.contains(&"audio.restore".to_owned()));
    assert!(log.contains(&"text.restore:A".to_owned()));
    assert!(!controller.is_applying());
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[test]
fn restore_reloads_a_different_document() {
    let mut stage = Stage::new();
    stage.say("In the intro", None);
    stage.controller.runtime_mut().switch_document("chapter2");
    stage.say("In chapter two", None);
    stage.take_log();

    stage.controller.rollback(1).unwrap();
    stage.controller.settle();

    let runtime = stage.controller.runtime();
    assert_eq!(runtime.loaded_documents(), &[DocumentRef::new("intro")]);
    assert_eq!(runtime.current_document(), Some(DocumentRef::new("intro")));
    assert_eq!(runtime.event_index(), 1);

    let log = stage.take_log();
    let load = log.iter().position(|e| e == "runtime.load_document:intro").unwrap();
    let position = log.iter().position(|e| e == "runtime.set_position:intro@1").unwrap();
    assert!(load < position);
}

#[test]
fn same_document_is_not_reloaded() {
    let mut stage = Stage::new();
    stage.say("A", None);
    stage.say("B", None);
    stage.controller.rollback(1).unwrap();
    stage.controller.settle();
    assert!(stage.controller.runtime().loaded_documents().is_empty());
}

#[test]
fn failed_document_load_still_positions_runtime() {
    let mut stage = Stage::new();
    stage.say("In the intro", None);
    stage.controller.runtime_mut().switch_document("chapter2");
    stage.say("In chapter two", None);
    stage.controller.runtime_mut().fail_loads(true);

    stage.controller.rollback(1).unwrap();
    assert_eq!(stage.controller.settle(), 2);
    assert_eq!(
        stage.controller.runtime().current_document(),
        Some(DocumentRef::new("intro"))
    );
    assert!(!stage.controller.is_applying());
}

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

#[test]
fn choice_restore_shows_prompt_and_needs_no_commit() {
    let mut stage = Stage::new();
    stage.say("Before the fork", None);
    stage.controller.runtime_mut().present_choice("Left or right?");
    assert!(stage.controller.on_choice_shown());
    stage.controller.on_choice_selected();
    stage.say("After the fork", None);
    stage.take_log();

    assert_eq!(stage.controller.rollback(1), Ok(1));
    assert!(!stage.choices_visible.get());

    assert_eq!(stage.controller.tick(), ApplyStatus::Idle);
    assert!(stage.choices_visible.get());
    assert!(!stage.controller.is_applying());
    assert!(!stage.controller.is_awaiting_commit());
    assert_eq!(
        stage.controller.runtime().interaction_state(),
        InteractionState::AwaitingChoice
    );
    assert!(!stage
        .take_log()
        .iter()
        .any(|entry| entry.starts_with("runtime.announce")));

    // Picking again branches from the prompt.
    assert_eq!(stage.controller.on_choice_selected().discarded, 1);
    assert_eq!(stage.controller.history().len(), 2);
}

#[test]
fn prompt_echo_after_choice_restore_keeps_the_branch() {
    let mut stage = Stage::new();
    stage.say("Before the fork", None);
    stage.controller.runtime_mut().present_choice("Left or right?");
    stage.controller.on_choice_shown();
    stage.controller.on_choice_selected();
    stage.say("After one", None);
    stage.say("After two", None);

    assert_eq!(stage.controller.rollback(2), Ok(2));
    stage.controller.settle();
    assert!(stage.choices_visible.get());

    // The host forwards the prompt the restore just re-showed.
    assert!(!stage.controller.on_choice_shown());
    assert_eq!(stage.controller.cursor(), Some(2));
    assert_eq!(stage.controller.history().len(), 4);

    assert_eq!(stage.controller.on_choice_selected().discarded, 2);
    let texts: Vec<_> = stage
        .controller
        .history()
        .iter()
        .map(|snapshot| snapshot.record().text.clone())
        .collect();
    assert_eq!(texts, vec!["Left or right?", "Before the fork"]);
}

#[test]
fn prompt_after_the_echo_is_captured_again() {
    let mut stage = Stage::new();
    stage.say("Before the fork", None);
    stage.controller.runtime_mut().present_choice("Left or right?");
    stage.controller.on_choice_shown();
    stage.controller.on_choice_selected();
    stage.say("After", None);

    stage.controller.rollback(1).unwrap();
    stage.controller.settle();
    stage.controller.on_choice_selected();

    stage.controller.runtime_mut().present_choice("Up or down?");
    assert!(stage.controller.on_choice_shown());
    assert_eq!(stage.controller.history().len(), 3);
}

// ---------------------------------------------------------------------------
// Transcript layouts
// ---------------------------------------------------------------------------

#[test]
fn transcript_is_replayed_instead_of_text_restore() {
    let mut stage = Stage::with_transcript();
    stage.say("Hello", Some("alice"));
    stage.say("World", None);
    let transcript = stage.transcript.clone().unwrap();
    assert_eq!(*transcript.borrow(), vec!["Hello", "World"]);
    assert_eq!(
        stage.controller.history().get(1).unwrap().layout_history(),
        Some(&LayoutHistory::new(serde_json::json!(["Hello"])))
    );
    stage.take_log();

    stage.controller.rollback(1).unwrap();
    stage.controller.settle();

    assert_eq!(*transcript.borrow(), vec!["Hello"]);
    let log = stage.take_log();
    let clear = log.iter().position(|e| e == "transcript.clear").unwrap();
    let replay = log.iter().position(|e| e == "transcript.replay").unwrap();
    assert!(clear < replay);
    assert!(!log.iter().any(|e| e.starts_with("text.restore")));
    assert!(log.contains(&"text.reveal_started".to_owned()));
    assert_eq!(
        stage.controller.runtime().interaction_state(),
        InteractionState::Waiting
    );
}

#[test]
fn advance_after_transcript_restore_advances_runtime() {
    let mut stage = Stage::with_transcript();
    stage.say("A", None);
    stage.say("B", None);
    stage.say("C", None);
    stage.controller.rollback(1).unwrap();
    stage.controller.settle();

    assert_eq!(
        stage.controller.on_advance_input(),
        AdvanceDisposition::CommittedAndAdvanced
    );
    assert_eq!(stage.controller.runtime().advances(), 1);
    assert_eq!(stage.controller.history().len(), 2);
}

#[test]
fn advancing_into_a_choice_forces_the_prompt() {
    let mut stage = Stage::with_transcript();
    stage.say("A", None);
    stage.say("B", None);
    stage.controller.rollback(1).unwrap();
    stage.controller.settle();

    stage.controller.runtime_mut().queue_choice();
    stage.controller.on_advance_input();
    assert!(!stage.choices_visible.get());

    stage.controller.tick();
    assert!(stage.choices_visible.get());
}

#[test]
fn visible_prompt_is_left_alone() {
    let mut stage = Stage::with_transcript();
    stage.say("A", None);
    stage.say("B", None);
    stage.controller.rollback(1).unwrap();
    stage.controller.settle();

    stage.controller.runtime_mut().queue_choice();
    stage.controller.on_advance_input();
    stage.choices_visible.set(true);
    stage.take_log();

    stage.controller.tick();
    assert!(!stage.take_log().contains(&"choices.show".to_owned()));
}
