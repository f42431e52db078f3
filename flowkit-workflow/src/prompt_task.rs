use async_trait::async_trait;
use flowkit_core::{ModelBackend, Result, TaskContext, inject_state};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::TaskExecutor;

/// Renders an instruction template from the task's inputs and hands it to a backend.
pub struct PromptExecutor {
    instruction: String,
    backend: Arc<dyn ModelBackend>,
}

impl PromptExecutor {
    pub fn new(instruction: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        Self { instruction: instruction.into(), backend }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

#[async_trait]
impl TaskExecutor for PromptExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<Value> {
        let prompt = inject_state(&self.instruction, ctx.inputs())?;
        debug!(
            task = %ctx.task_name(),
            backend = %self.backend.name(),
            prompt_len = prompt.len(),
            "Rendered prompt"
        );
        let text = self.backend.generate(ctx, &prompt).await?;
        Ok(Value::String(text))
    }
}
