use crate::{Result, TaskContext};
use async_trait::async_trait;

/// Backend that turns a rendered prompt into text (an LLM call, a tool, a script).
///
/// Retry policy, if any, belongs to the backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    /// The task context is passed through so a backend can escalate or reach
    /// connectors on the task's behalf.
    async fn generate(&self, ctx: &TaskContext, prompt: &str) -> Result<String>;
}
