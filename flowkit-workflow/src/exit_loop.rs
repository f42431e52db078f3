use flowkit_core::TaskContext;
use serde_json::{Value, json};

pub const EXIT_LOOP_TOOL_NAME: &str = "exit_loop";

/// Stops the enclosing loop and returns the value a reviewer task usually writes
/// when it approves.
///
/// ```rust,ignore
/// TaskUnit::builder("reviewer")
///     .input("draft")
///     .output_key("review_notes")
///     .handler(|ctx| async move {
///         if good_enough(&ctx) {
///             return Ok(exit_loop(&ctx));
///         }
///         Ok(json!("tighten the intro"))
///     })
///     .build()?;
/// ```
pub fn exit_loop(ctx: &TaskContext) -> Value {
    ctx.escalate();
    json!({
        "status": "approved",
        "message": format!("Quality check passed in '{}', no further iterations needed", ctx.task_name()),
    })
}
