//! In-memory collaborators for tests, demos and host integration checks.
//! Built only with the `testing` feature.
//!
//! Every scripted collaborator appends what it was asked to do to a shared
//! [`CallLog`], so a test can assert on the exact order of restore steps:
//!
//! ```
//! use rewind_engine::testing::{call_log, ScriptedRuntime};
//! use rewind_engine::collab::NarrativeRuntime;
//!
//! let log = call_log();
//! let mut runtime = ScriptedRuntime::with_log("intro", log.clone());
//! runtime.cancel_event_hooks();
//! assert_eq!(*log.borrow(), vec!["runtime.cancel_hooks"]);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use rewind_history::record::{DocumentRef, FieldValue, InteractionState, NodeHandle, StateRecord};
use rewind_history::snapshot::LayoutHistory;

use crate::collab::{
    AdditiveDisplay, ChoicePrompt, NarrativeRuntime, Presentation, SpeakerInfo, Subsystem,
    TextAnnouncement, TextDisplay, TranscriptHistory,
};

/// Shared, ordered record of collaborator calls.
pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn call_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn log_call(log: &CallLog, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

// ---------------------------------------------------------------------------
// ScriptedRuntime
// ---------------------------------------------------------------------------

/// A narrative runtime driven by explicit script calls.
///
/// The loaded document and event cursor are kept apart from the state
/// record, as in a real runtime: replacing the record does not move the
/// cursor, [`set_position`](NarrativeRuntime::set_position) does.
#[derive(Debug)]
pub struct ScriptedRuntime {
    log: CallLog,
    record: StateRecord,
    document: Option<DocumentRef>,
    event_index: usize,
    interaction: InteractionState,
    event_is_choice: bool,
    speakers: BTreeMap<String, SpeakerInfo>,
    announcements: Vec<TextAnnouncement>,
    loaded: Vec<DocumentRef>,
    advances: u32,
    fail_loads: bool,
    next_handle: u64,
}

impl ScriptedRuntime {
    pub fn new(document: &str) -> Self {
        Self::with_log(document, call_log())
    }

    pub fn with_log(document: &str, log: CallLog) -> Self {
        Self {
            log,
            record: StateRecord::default(),
            document: Some(DocumentRef::new(document)),
            event_index: 0,
            interaction: InteractionState::Idle,
            event_is_choice: false,
            speakers: BTreeMap::new(),
            announcements: Vec::new(),
            loaded: Vec::new(),
            advances: 0,
            fail_loads: false,
            next_handle: 1,
        }
    }

    /// Move to the next event and show `text` as fully revealed.
    ///
    /// The live record also gains a volatile text-node handle, the way a
    /// real text subsystem tracks its label.
    pub fn say(&mut self, text: &str, speaker: Option<&str>) {
        self.event_index += 1;
        self.record.text = text.to_owned();
        self.record.speaker = speaker.map(str::to_owned);
        self.record.reveal_progress = Some(1.0);
        self.record
            .set_field("text_node", FieldValue::Handle(NodeHandle(self.next_handle)));
        self.next_handle += 1;
        self.interaction = InteractionState::Idle;
        self.event_is_choice = false;
    }

    /// Move to the next event and put up a choice prompt.
    pub fn present_choice(&mut self, prompt: &str) {
        self.event_index += 1;
        self.record.text = prompt.to_owned();
        self.record.speaker = None;
        self.interaction = InteractionState::AwaitingChoice;
        self.event_is_choice = true;
    }

    /// Mark the next event as a choice, reached by the next `advance()`.
    pub fn queue_choice(&mut self) {
        self.event_is_choice = true;
    }

    /// Store a plain-data field in the live record.
    pub fn set_field(&mut self, name: &str, value: serde_json::Value) {
        self.record.set_field(name, FieldValue::Data(value));
    }

    pub fn switch_document(&mut self, document: &str) {
        self.document = Some(DocumentRef::new(document));
        self.event_index = 0;
    }

    pub fn unload_document(&mut self) {
        self.document = None;
    }

    pub fn add_speaker(&mut self, id: &str, display_name: &str, portrait: Option<&str>) {
        self.speakers.insert(
            id.to_owned(),
            SpeakerInfo {
                id: id.to_owned(),
                display_name: display_name.to_owned(),
                portrait: portrait.map(str::to_owned),
            },
        );
    }

    /// Make every subsequent `load_document` fail.
    pub fn fail_loads(&mut self, fail: bool) {
        self.fail_loads = fail;
    }

    pub fn live_record(&self) -> &StateRecord {
        &self.record
    }

    pub fn event_index(&self) -> usize {
        self.event_index
    }

    pub fn announcements(&self) -> &[TextAnnouncement] {
        &self.announcements
    }

    pub fn loaded_documents(&self) -> &[DocumentRef] {
        &self.loaded
    }

    pub fn advances(&self) -> u32 {
        self.advances
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

impl NarrativeRuntime for ScriptedRuntime {
    fn capture_state(&self) -> StateRecord {
        let mut record = self.record.clone();
        record.document = self.document.clone();
        record.event_index = self.event_index;
        record
    }

    fn replace_state_record(&mut self, record: StateRecord) {
        log_call(&self.log, "runtime.replace_record");
        self.record = record;
    }

    fn interaction_state(&self) -> InteractionState {
        self.interaction
    }

    fn set_interaction_state(&mut self, state: InteractionState) {
        log_call(&self.log, format!("runtime.set_interaction:{state:?}"));
        self.interaction = state;
    }

    fn current_document(&self) -> Option<DocumentRef> {
        self.document.clone()
    }

    fn load_document(&mut self, document: &DocumentRef) -> anyhow::Result<()> {
        log_call(&self.log, format!("runtime.load_document:{document}"));
        if self.fail_loads {
            anyhow::bail!("document '{document}' is not available");
        }
        self.loaded.push(document.clone());
        Ok(())
    }

    fn set_position(&mut self, document: DocumentRef, event_index: usize) {
        log_call(&self.log, format!("runtime.set_position:{document}@{event_index}"));
        self.document = Some(document);
        self.event_index = event_index;
    }

    fn cancel_event_hooks(&mut self) {
        log_call(&self.log, "runtime.cancel_hooks");
    }

    fn advance(&mut self) {
        log_call(&self.log, "runtime.advance");
        self.advances += 1;
        self.event_index += 1;
        self.interaction = if self.event_is_choice {
            InteractionState::AwaitingChoice
        } else {
            InteractionState::Idle
        };
    }

    fn current_event_is_choice(&self) -> bool {
        self.event_is_choice
    }

    fn resolve_speaker(&self, speaker: &str) -> Option<SpeakerInfo> {
        self.speakers.get(speaker).cloned()
    }

    fn announce_text(&mut self, announcement: TextAnnouncement) {
        log_call(&self.log, format!("runtime.announce:{}", announcement.text));
        self.announcements.push(announcement);
    }
}

// ---------------------------------------------------------------------------
// Subsystems
// ---------------------------------------------------------------------------

/// Plain text display.
#[derive(Debug)]
pub struct TextWidget {
    log: CallLog,
}

impl TextWidget {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl Subsystem for TextWidget {
    fn name(&self) -> &str {
        "text"
    }

    fn restore(&mut self, record: &StateRecord) -> anyhow::Result<()> {
        log_call(&self.log, format!("text.restore:{}", record.text));
        Ok(())
    }

    fn as_text_display(&mut self) -> Option<&mut dyn TextDisplay> {
        Some(self)
    }
}

impl TextDisplay for TextWidget {
    fn reveal_started(&mut self) {
        log_call(&self.log, "text.reveal_started");
    }

    fn hide_transient_bubbles(&mut self) {
        log_call(&self.log, "text.hide_bubbles");
    }
}

/// Choice prompt widgets. Visibility is shared so tests can observe it
/// after the widget has been handed to the controller.
#[derive(Debug)]
pub struct ChoiceWidget {
    log: CallLog,
    visible: Rc<Cell<bool>>,
}

impl ChoiceWidget {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            visible: Rc::new(Cell::new(false)),
        }
    }

    pub fn visibility(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.visible)
    }
}

impl Subsystem for ChoiceWidget {
    fn name(&self) -> &str {
        "choices"
    }

    fn restore(&mut self, _record: &StateRecord) -> anyhow::Result<()> {
        log_call(&self.log, "choices.restore");
        Ok(())
    }

    fn as_choice_prompt(&mut self) -> Option<&mut dyn ChoicePrompt> {
        Some(self)
    }
}

impl ChoicePrompt for ChoiceWidget {
    fn hide_choices(&mut self) {
        log_call(&self.log, "choices.hide");
        self.visible.set(false);
    }

    fn cancel_reveal_timers(&mut self) {
        log_call(&self.log, "choices.cancel_timers");
    }

    fn show_choices(&mut self) {
        log_call(&self.log, "choices.show");
        self.visible.set(true);
    }

    fn choices_visible(&self) -> bool {
        self.visible.get()
    }
}

/// A display that only adds on restore (portraits, audio channels).
#[derive(Debug)]
pub struct AdditiveLayer {
    name: String,
    log: CallLog,
    fail_restore: bool,
}

impl AdditiveLayer {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_owned(),
            log,
            fail_restore: false,
        }
    }

    /// A layer whose restore always fails.
    pub fn failing(name: &str, log: CallLog) -> Self {
        Self {
            fail_restore: true,
            ..Self::new(name, log)
        }
    }
}

impl Subsystem for AdditiveLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn restore(&mut self, record: &StateRecord) -> anyhow::Result<()> {
        log_call(&self.log, format!("{}.restore", self.name));
        if self.fail_restore {
            anyhow::bail!("{} could not restore", self.name);
        }
        if let Some(value) = record.field(&self.name).and_then(FieldValue::as_data) {
            log_call(&self.log, format!("{}.show:{value}", self.name));
        }
        Ok(())
    }

    fn as_additive_display(&mut self) -> Option<&mut dyn AdditiveDisplay> {
        Some(self)
    }
}

impl AdditiveDisplay for AdditiveLayer {
    fn clear_all(&mut self) {
        log_call(&self.log, format!("{}.clear", self.name));
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// A layout, optionally keeping a chat-style transcript.
#[derive(Debug)]
pub struct ScriptedLayout {
    log: CallLog,
    transcript: Option<Rc<RefCell<Vec<String>>>>,
}

impl ScriptedLayout {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            transcript: None,
        }
    }

    pub fn with_transcript(log: CallLog) -> Self {
        Self {
            log,
            transcript: Some(Rc::new(RefCell::new(Vec::new()))),
        }
    }

    /// Shared handle to the transcript lines, if this layout keeps one.
    pub fn transcript_lines(&self) -> Option<Rc<RefCell<Vec<String>>>> {
        self.transcript.clone()
    }
}

impl Presentation for ScriptedLayout {
    fn restore_layout(&mut self, _record: &StateRecord) -> anyhow::Result<()> {
        log_call(&self.log, "layout.restore");
        Ok(())
    }

    fn transcript(&mut self) -> Option<&mut dyn TranscriptHistory> {
        if self.transcript.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl TranscriptHistory for ScriptedLayout {
    fn history(&self) -> LayoutHistory {
        let lines = self
            .transcript
            .as_ref()
            .map(|lines| lines.borrow().clone())
            .unwrap_or_default();
        LayoutHistory::new(serde_json::json!(lines))
    }

    fn clear_history(&mut self) {
        log_call(&self.log, "transcript.clear");
        if let Some(lines) = &self.transcript {
            lines.borrow_mut().clear();
        }
    }

    fn replay_history(&mut self, history: &LayoutHistory) -> anyhow::Result<()> {
        log_call(&self.log, "transcript.replay");
        let replayed: Vec<String> = serde_json::from_value(history.as_value().clone())?;
        if let Some(lines) = &self.transcript {
            *lines.borrow_mut() = replayed;
        }
        Ok(())
    }
}
