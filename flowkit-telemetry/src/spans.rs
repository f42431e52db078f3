//! Span helpers for common pipeline operations
//!
//! Provides pre-configured spans for instrumenting runs, nodes, tasks, and
//! connector calls.

use tracing::Span;

/// Create a span covering one whole pipeline run
///
/// # Example
/// ```
/// use flowkit_telemetry::pipeline_run_span;
/// let span = pipeline_run_span("report-app", "inv-123");
/// let _enter = span.enter();
/// ```
pub fn pipeline_run_span(app_name: &str, invocation_id: &str) -> Span {
    tracing::info_span!("pipeline.run", app.name = app_name, invocation.id = invocation_id)
}

/// Create a span for a composer (sequential, parallel, loop) execution
///
/// # Arguments
/// * `node_name` - Name of the composer
/// * `kind` - Composer kind label
/// * `invocation_id` - Unique ID for this run
pub fn node_run_span(node_name: &str, kind: &str, invocation_id: &str) -> Span {
    tracing::info_span!(
        "node.run",
        node.name = node_name,
        node.kind = kind,
        invocation.id = invocation_id,
    )
}

/// Create a span for one task unit execution
///
/// The `iteration` field is filled in when the task runs inside a loop.
pub fn task_execute_span(task_name: &str, output_key: &str, iteration: Option<u32>) -> Span {
    tracing::info_span!(
        "task.execute",
        task.name = task_name,
        task.output_key = output_key,
        task.iteration = iteration,
    )
}

/// Create a span for a connector request
pub fn connector_call_span(connector: &str, tool_name: &str) -> Span {
    tracing::debug_span!("connector.call", connector.name = connector, tool.name = tool_name)
}
