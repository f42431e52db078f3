//! Research -> draft -> refine report pipeline.
//!
//! Three researchers run in parallel, a drafter combines their notes, and a
//! reviewer/editor loop polishes the draft until the reviewer approves it.
//! A scripted backend stands in for a real model so the example runs offline.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p flowkit-workflow --example report_pipeline
//! ```

use async_trait::async_trait;
use flowkit_core::{
    ModelBackend, Node, RunContext, StateStore, TaskContext, validate_pipeline,
};
use flowkit_workflow::{ExitCheck, LoopFlow, ParallelFlow, SequentialFlow, TaskUnit, exit_loop};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Answers every prompt from a fixed script; approves the second review.
struct ScriptedBackend {
    reviews: AtomicU32,
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, ctx: &TaskContext, prompt: &str) -> flowkit_core::Result<String> {
        let text = match ctx.task_name() {
            "overview_researcher" => "Tides are the periodic rise and fall of sea level.".to_string(),
            "examples_researcher" => "The Bay of Fundy; the Severn estuary.".to_string(),
            "limitations_researcher" => "Local geography makes prediction hard.".to_string(),
            "drafter" => format!("DRAFT v1 ({} prompt chars)", prompt.len()),
            "reviewer" => {
                if self.reviews.fetch_add(1, Ordering::SeqCst) >= 1 {
                    exit_loop(ctx);
                    "Approved.".to_string()
                } else {
                    "1. Expand the conclusion.".to_string()
                }
            }
            "editor" => format!("{} + edits", ctx.text("draft").unwrap_or_default()),
            other => format!("{other} has nothing to say"),
        };
        Ok(text)
    }
}

fn prompt_task(
    name: &str,
    output_key: &str,
    instruction: &str,
    backend: &Arc<dyn ModelBackend>,
) -> anyhow::Result<Arc<dyn Node>> {
    Ok(Arc::new(
        TaskUnit::builder(name)
            .output_key(output_key)
            .instruction(instruction)
            .backend(backend.clone())
            .build()?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowkit_telemetry::init_telemetry("report-pipeline")
        .map_err(|e| anyhow::anyhow!("telemetry: {e}"))?;

    let backend: Arc<dyn ModelBackend> = Arc::new(ScriptedBackend { reviews: AtomicU32::new(0) });

    let research = ParallelFlow::new(
        "research",
        vec![
            prompt_task("overview_researcher", "overview", "Write an overview of {topic}.", &backend)?,
            prompt_task("examples_researcher", "examples", "List examples of {topic}.", &backend)?,
            prompt_task(
                "limitations_researcher",
                "limitations",
                "Analyse the limitations of {topic}.",
                &backend,
            )?,
        ],
    )?
    .with_description("Researches a topic from three angles at once");

    let drafter = prompt_task(
        "drafter",
        "draft",
        "OVERVIEW\n{overview}\n\nEXAMPLES\n{examples}\n\nLIMITATIONS\n{limitations}",
        &backend,
    )?;

    let refine = LoopFlow::builder("refine")
        .description("Reviewer/editor cycles until the reviewer approves")
        .sub_node(prompt_task("reviewer", "review_notes", "Review this draft:\n{draft}", &backend)?)
        .sub_node(prompt_task(
            "editor",
            "draft",
            "Revise the draft:\n{draft}\n\nNotes:\n{review_notes}",
            &backend,
        )?)
        .max_iterations(3)
        .exit_check(ExitCheck::AfterEachChild)
        .build()?;

    let pipeline = SequentialFlow::new(
        "report_pipeline",
        vec![Arc::new(research), drafter, Arc::new(refine)],
    )
    .with_description("Parallel research, drafting, and iterative refinement");

    let state = StateStore::new();
    state.set("topic", json!("ocean tides"));
    validate_pipeline(&pipeline, state.keys())?;

    let report = pipeline.run(Arc::new(RunContext::new("report-1", state.clone()))).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("final draft: {}", state.get("draft").unwrap_or_default());
    Ok(())
}
