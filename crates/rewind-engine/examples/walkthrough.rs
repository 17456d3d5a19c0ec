//! A short scripted session: read three lines, roll back twice, pick a new
//! branch, and hit the author's checkpoint.
//!
//! Run with `RUST_LOG=rewind_engine=debug` to watch the capture and restore
//! protocol.

use rewind_engine::logging::init_tracing;
use rewind_engine::prelude::*;
use rewind_engine::testing::{call_log, AdditiveLayer, ChoiceWidget, ScriptedLayout, ScriptedRuntime, TextWidget};

fn main() -> anyhow::Result<()> {
    init_tracing("warn")?;

    let log = call_log();
    let mut runtime = ScriptedRuntime::with_log("prologue", log.clone());
    runtime.add_speaker("mira", "Mira", Some("mira_smile.png"));
    runtime.add_speaker("tomas", "Tomas", None);

    let collaborators = Collaborators::new(runtime)
        .with_presentation(ScriptedLayout::new(log.clone()))
        .with_subsystem(TextWidget::new(log.clone()))
        .with_subsystem(ChoiceWidget::new(log.clone()))
        .with_subsystem(AdditiveLayer::new("portraits", log.clone()));
    let mut controller = RollbackController::new(collaborators, HistoryConfig::default())?;
    controller.subscribe(|event| println!("  event: {}", serde_json::json!(event)));

    let script = [
        ("The lighthouse has been dark for a week.", Some("mira")),
        ("Someone has to go up there.", Some("tomas")),
        ("Not tonight. The storm is too strong.", Some("mira")),
    ];
    for (text, speaker) in script {
        controller.runtime_mut().say(text, speaker);
        controller.on_text_revealed(&RevealNotice::new(text, speaker));
        controller.tick();
    }
    println!("captured {} snapshots", controller.history().len());

    for _ in 0..2 {
        let target = controller.rollback(1)?;
        let ticks = controller.settle();
        println!(
            "rolled back to index {target} in {ticks} ticks: {:?}",
            controller.runtime().live_record().text
        );
    }

    let disposition = controller.on_advance_input();
    println!(
        "advance -> {disposition:?}, history now holds {} snapshots",
        controller.history().len()
    );

    controller.runtime_mut().say("Then we go together.", Some("mira"));
    controller.on_text_revealed(&RevealNotice::new("Then we go together.", Some("mira")));
    HistoryMarker::Block.execute(&mut controller);

    match controller.rollback(1) {
        Ok(_) => println!("rollback allowed"),
        Err(error) => println!("rollback refused: {error}"),
    }

    println!("{} collaborator calls recorded", log.borrow().len());
    Ok(())
}
