use flowkit_core::{
    FlowError, Node, RunConfig, RunContext, StateStore, StopReason, validate_pipeline,
};
use flowkit_workflow::{ExitCheck, LoopFlow, ParallelFlow, SequentialFlow, TaskUnit, exit_loop};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn constant(name: &str, key: &str, value: Value) -> Arc<dyn Node> {
    Arc::new(
        TaskUnit::builder(name)
            .output_key(key)
            .handler(move |_ctx| {
                let value = value.clone();
                async move { Ok(value) }
            })
            .build()
            .unwrap(),
    )
}

fn failing(name: &str, key: &str) -> Arc<dyn Node> {
    let task = name.to_string();
    Arc::new(
        TaskUnit::builder(name)
            .output_key(key)
            .handler(move |_ctx| {
                let task = task.clone();
                async move { Err(FlowError::execution(task, "backend unavailable")) }
            })
            .build()
            .unwrap(),
    )
}

fn run_ctx(state: &StateStore) -> Arc<RunContext> {
    Arc::new(RunContext::new("inv-test", state.clone()))
}

/// Reviewer that approves on `approve_on`, counting how often it ran.
fn reviewer(approve_on: u32, runs: Arc<AtomicU32>) -> Arc<dyn Node> {
    Arc::new(
        TaskUnit::builder("reviewer")
            .input("draft")
            .optional_input("revised")
            .output_key("review_notes")
            .handler(move |ctx| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    if ctx.iteration() == Some(approve_on) {
                        return Ok(exit_loop(&ctx));
                    }
                    Ok(json!(format!("iteration {:?}: tighten the intro", ctx.iteration())))
                }
            })
            .build()
            .unwrap(),
    )
}

fn editor(runs: Arc<AtomicU32>) -> Arc<dyn Node> {
    Arc::new(
        TaskUnit::builder("editor")
            .inputs(["draft", "review_notes"])
            .output_key("revised")
            .handler(move |ctx| {
                let runs = runs.clone();
                async move {
                    let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(json!(format!("{} (edit {n})", ctx.text("draft").unwrap_or_default())))
                }
            })
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_fan_out_then_fan_in() {
    let research =
        ParallelFlow::new("research", vec![constant("a", "x", json!("1")), constant("b", "y", json!("2"))])
            .unwrap();
    let combine: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("c")
            .inputs(["x", "y"])
            .output_key("z")
            .handler(|ctx| async move {
                let x = ctx.text("x").unwrap_or_default();
                let y = ctx.text("y").unwrap_or_default();
                Ok(json!(format!("{x}+{y}")))
            })
            .build()
            .unwrap(),
    );
    let pipeline = SequentialFlow::new("pipeline", vec![Arc::new(research), combine]);
    validate_pipeline(&pipeline, Vec::<String>::new()).unwrap();

    let state = StateStore::new();
    let report = pipeline.run(run_ctx(&state)).await.unwrap();

    assert_eq!(state.get("x"), Some(json!("1")));
    assert_eq!(state.get("y"), Some(json!("2")));
    assert_eq!(state.get("z"), Some(json!("1+2")));
    assert_eq!(state.len(), 3);
    assert_eq!(report.executions("c"), 1);
    assert_eq!(report.find("research").map(|r| r.children.len()), Some(2));
}

#[tokio::test]
async fn test_sequential_fails_fast() {
    let later_runs = Arc::new(AtomicU32::new(0));
    let counter = later_runs.clone();
    let later: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("later")
            .output_key("late")
            .handler(move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(true))
                }
            })
            .build()
            .unwrap(),
    );
    let pipeline = SequentialFlow::new(
        "pipeline",
        vec![constant("first", "early", json!(1)), failing("broken", "mid"), later],
    );

    let state = StateStore::new();
    let err = pipeline.run(run_ctx(&state)).await.unwrap_err();

    assert!(matches!(err, FlowError::Execution { ref node, .. } if node == "broken"));
    assert_eq!(later_runs.load(Ordering::SeqCst), 0);
    // Earlier writes stay visible.
    assert_eq!(state.get("early"), Some(json!(1)));
    assert!(!state.contains_key("mid"));
}

#[tokio::test]
async fn test_loop_signaled_on_first_iteration_runs_once() {
    let runs = Arc::new(AtomicU32::new(0));
    let flow = LoopFlow::builder("refine")
        .sub_node(reviewer(1, runs.clone()))
        .max_iterations(5)
        .build()
        .unwrap();

    let state = StateStore::new();
    state.set("draft", json!("text"));
    let report = flow.run(run_ctx(&state)).await.unwrap();

    assert_eq!(report.stop, Some(StopReason::Signaled { iteration: 1 }));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_loop_without_signal_exhausts_cap() {
    let runs = Arc::new(AtomicU32::new(0));
    let flow = LoopFlow::builder("refine")
        .sub_node(reviewer(u32::MAX, runs.clone()))
        .max_iterations(3)
        .build()
        .unwrap();

    let state = StateStore::new();
    state.set("draft", json!("text"));
    let report = flow.run(run_ctx(&state)).await.unwrap();

    assert_eq!(report.stop, Some(StopReason::CapExhausted { iterations: 3 }));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_reviewer_editor_loop_stops_at_second_iteration() {
    let reviews = Arc::new(AtomicU32::new(0));
    let edits = Arc::new(AtomicU32::new(0));
    let flow = LoopFlow::builder("refine")
        .sub_node(reviewer(2, reviews.clone()))
        .sub_node(editor(edits.clone()))
        .max_iterations(3)
        .build()
        .unwrap();

    let state = StateStore::new();
    state.set("draft", json!("text"));
    let report = flow.run(run_ctx(&state)).await.unwrap();

    assert_eq!(report.stop, Some(StopReason::Signaled { iteration: 2 }));
    assert_eq!(reviews.load(Ordering::SeqCst), 2);
    // The iteration that raised the signal is completed; iteration 3 never starts.
    assert_eq!(edits.load(Ordering::SeqCst), 2);
    assert_eq!(state.get("revised"), Some(json!("text (edit 2)")));
    assert_eq!(state.get("review_notes").map(|v| v["status"].clone()), Some(json!("approved")));
}

#[tokio::test]
async fn test_exit_check_after_each_child_skips_rest_of_iteration() {
    let reviews = Arc::new(AtomicU32::new(0));
    let edits = Arc::new(AtomicU32::new(0));
    let flow = LoopFlow::builder("refine")
        .sub_node(reviewer(2, reviews.clone()))
        .sub_node(editor(edits.clone()))
        .max_iterations(3)
        .exit_check(ExitCheck::AfterEachChild)
        .build()
        .unwrap();

    let state = StateStore::new();
    state.set("draft", json!("text"));
    let report = flow.run(run_ctx(&state)).await.unwrap();

    assert_eq!(report.stop, Some(StopReason::Signaled { iteration: 2 }));
    assert_eq!(edits.load(Ordering::SeqCst), 1);
    assert_eq!(report.executions("editor"), 1);
    assert_eq!(report.executions("reviewer"), 2);
}

#[tokio::test]
async fn test_nested_loop_escalation_stops_only_inner_loop() {
    // Escalates on every inner iteration, so each inner run lasts one iteration.
    let inner_runs = Arc::new(AtomicU32::new(0));
    let counter = inner_runs.clone();
    let inner_task: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("inner_task")
            .output_key("inner")
            .handler(move |ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(exit_loop(&ctx))
                }
            })
            .build()
            .unwrap(),
    );
    let inner = LoopFlow::builder("inner").sub_node(inner_task).max_iterations(10).build().unwrap();
    let outer = LoopFlow::builder("outer")
        .sub_node(Arc::new(inner))
        .max_iterations(3)
        .build()
        .unwrap();

    let state = StateStore::new();
    let report = outer.run(run_ctx(&state)).await.unwrap();

    // The inner escalation stops only the inner loop.
    assert_eq!(report.stop, Some(StopReason::CapExhausted { iterations: 3 }));
    assert_eq!(inner_runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_parallel_collects_failures_and_keeps_sibling_writes() {
    let research = ParallelFlow::new(
        "research",
        vec![failing("a", "x"), constant("b", "y", json!("ok")), failing("c", "w")],
    )
    .unwrap();

    let state = StateStore::new();
    let err = research.run(run_ctx(&state)).await.unwrap_err();

    match err {
        FlowError::Aggregate { node, total, failures } => {
            assert_eq!(node, "research");
            assert_eq!(total, 3);
            let failed: Vec<_> = failures.iter().map(|f| f.node.as_str()).collect();
            assert_eq!(failed, vec!["a", "c"]);
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }
    assert_eq!(state.get("y"), Some(json!("ok")));
    assert!(!state.contains_key("x"));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_grace_period_times_out_stragglers() {
    let slow: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("slow")
            .output_key("y")
            .handler(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!("late"))
            })
            .build()
            .unwrap(),
    );
    let research = ParallelFlow::new("research", vec![failing("a", "x"), slow]).unwrap();

    let state = StateStore::new();
    let ctx = Arc::new(
        RunContext::new("inv-test", state.clone())
            .with_run_config(RunConfig { parallel_grace: Duration::from_secs(1) }),
    );
    let err = research.run(ctx).await.unwrap_err();

    let FlowError::Aggregate { failures, .. } = err else {
        panic!("expected aggregate error");
    };
    assert_eq!(failures.len(), 2);
    assert!(matches!(
        failures[1].error,
        FlowError::Timeout { ref node, after } if node == "slow" && after == Duration::from_secs(1)
    ));
    assert!(!state.contains_key("y"));
}

#[tokio::test]
async fn test_cancellation_keeps_written_values() {
    let token = CancellationToken::new();
    let canceller: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("a")
            .output_key("x")
            .handler(|ctx| async move {
                ctx.cancellation_token().cancel();
                Ok(json!("written"))
            })
            .build()
            .unwrap(),
    );
    let pipeline =
        SequentialFlow::new("pipeline", vec![canceller, constant("b", "y", json!("never"))]);

    let state = StateStore::new();
    let ctx = Arc::new(RunContext::new("inv-test", state.clone()).with_cancellation(token.clone()));
    let err = pipeline.run(ctx).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.failed_node(), Some("b"));
    assert!(token.is_cancelled());
    assert_eq!(state.get("x"), Some(json!("written")));
    assert!(!state.contains_key("y"));
}

#[tokio::test]
async fn test_escalation_inside_parallel_stops_enclosing_loop() {
    let approve: Arc<dyn Node> = Arc::new(
        TaskUnit::builder("approve")
            .output_key("verdict")
            .handler(|ctx| async move { Ok(exit_loop(&ctx)) })
            .build()
            .unwrap(),
    );
    let checks =
        ParallelFlow::new("checks", vec![approve, constant("lint", "lint", json!("clean"))]).unwrap();
    let flow = LoopFlow::builder("refine").sub_node(Arc::new(checks)).max_iterations(4).build().unwrap();

    let state = StateStore::new();
    let report = flow.run(run_ctx(&state)).await.unwrap();
    assert_eq!(report.stop, Some(StopReason::Signaled { iteration: 1 }));
}

#[tokio::test]
async fn test_events_record_branch_and_iteration() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let flow = LoopFlow::builder("refine")
        .sub_node(reviewer(2, Arc::new(AtomicU32::new(0))))
        .max_iterations(3)
        .build()
        .unwrap();

    let state = StateStore::new();
    state.set("draft", json!("text"));
    let ctx = Arc::new(RunContext::new("inv-test", state).with_event_sink(tx).for_child("refine"));
    flow.run(ctx).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].branch, "refine.reviewer");
    assert_eq!(events[0].iteration, Some(1));
    assert!(!events[0].actions.escalate);
    assert_eq!(events[1].iteration, Some(2));
    assert!(events[1].actions.escalate);
    assert!(events[1].actions.state_delta.contains_key("review_notes"));
}
