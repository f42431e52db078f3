mod loop_flow;
mod parallel_flow;
mod sequential_flow;

pub use loop_flow::{DEFAULT_LOOP_MAX_ITERATIONS, ExitCheck, LoopFlow, LoopFlowBuilder};
pub use parallel_flow::ParallelFlow;
pub use sequential_flow::SequentialFlow;

use flowkit_core::{FlowError, Node, Result, RunContext, RunReport, TerminationSignal};
use std::sync::Arc;
use tracing::debug;

/// Runs `children` in declaration order, failing fast.
///
/// With `stop_on`, the signal is checked after each child and the pass ends as
/// soon as it is set.
pub(crate) async fn run_in_order(
    children: &[Arc<dyn Node>],
    ctx: &RunContext,
    stop_on: Option<&TerminationSignal>,
) -> Result<Vec<RunReport>> {
    let mut reports = Vec::with_capacity(children.len());

    for (index, child) in children.iter().enumerate() {
        if ctx.cancellation_token().is_cancelled() {
            return Err(FlowError::Cancelled { node: child.name().to_string() });
        }

        let report = child.run(Arc::new(ctx.for_child(child.name()))).await?;
        reports.push(report);

        if stop_on.is_some_and(TerminationSignal::is_set) {
            let skipped = children.len() - index - 1;
            if skipped > 0 {
                debug!(after = %child.name(), skipped, "Termination signal set, skipping remaining children");
            }
            return Ok(reports);
        }
    }

    Ok(reports)
}
