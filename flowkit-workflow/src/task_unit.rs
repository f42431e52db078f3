use crate::prompt_task::PromptExecutor;
use async_trait::async_trait;
use flowkit_core::{
    Event, FlowError, ModelBackend, Node, NodeKind, Result, RunContext, RunReport, TaskContext,
    template_keys, validate_state_key,
};
use flowkit_telemetry::{Instrument, task_execute_span};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// The capability that does a task's actual work.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> Result<Value>;
}

type TaskHandler =
    Box<dyn Fn(TaskContext) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

struct FnExecutor {
    handler: TaskHandler,
}

#[async_trait]
impl TaskExecutor for FnExecutor {
    async fn execute(&self, ctx: &TaskContext) -> Result<Value> {
        (self.handler)(ctx.clone()).await
    }
}

/// Smallest schedulable unit: reads declared inputs, writes one output key.
pub struct TaskUnit {
    name: String,
    description: String,
    input_keys: Vec<String>,
    optional_input_keys: Vec<String>,
    output_key: String,
    executor: Arc<dyn TaskExecutor>,
}

impl TaskUnit {
    pub fn builder(name: impl Into<String>) -> TaskUnitBuilder {
        TaskUnitBuilder::new(name)
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn optional_input_keys(&self) -> &[String] {
        &self.optional_input_keys
    }

    fn read_keys(&self) -> Vec<&str> {
        self.input_keys
            .iter()
            .chain(self.optional_input_keys.iter())
            .map(String::as_str)
            .collect()
    }

    async fn execute(&self, task_ctx: &TaskContext) -> Result<Value> {
        let token = task_ctx.cancellation_token().clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(FlowError::Cancelled { node: self.name.clone() }),
            result = self.executor.execute(task_ctx) => result.map_err(|e| match e {
                FlowError::Execution { .. } | FlowError::Cancelled { .. } => e,
                other => FlowError::execution(&self.name, other),
            }),
        }
    }
}

#[async_trait]
impl Node for TaskUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Task
    }

    fn children(&self) -> &[Arc<dyn Node>] {
        &[]
    }

    fn input_keys(&self) -> &[String] {
        &self.input_keys
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key.clone()]
    }

    async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport> {
        let task_ctx = ctx.task_context(&self.name, &self.read_keys());
        let span = task_execute_span(&self.name, &self.output_key, ctx.iteration());

        let value = match self.execute(&task_ctx).instrument(span).await {
            Ok(value) => value,
            Err(e) => {
                warn!(task = %self.name, branch = %ctx.branch(), error = %e, "Task failed");
                return Err(e);
            }
        };

        ctx.state().set(self.output_key.clone(), value.clone());
        debug!(
            task = %self.name,
            output_key = %self.output_key,
            escalated = task_ctx.escalated(),
            "Task wrote output"
        );

        let mut event = Event::new(ctx.invocation_id());
        event.author = self.name.clone();
        event.branch = ctx.branch().to_string();
        event.iteration = ctx.iteration();
        event.actions.state_delta.insert(self.output_key.clone(), value);
        event.actions.escalate = task_ctx.escalated();
        ctx.emit(event);

        Ok(RunReport::task(&self.name))
    }
}

pub struct TaskUnitBuilder {
    name: String,
    description: String,
    input_keys: Vec<String>,
    optional_input_keys: Vec<String>,
    output_key: Option<String>,
    executor: Option<Arc<dyn TaskExecutor>>,
    instruction: Option<String>,
    backend: Option<Arc<dyn ModelBackend>>,
}

impl TaskUnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_keys: Vec::new(),
            optional_input_keys: Vec::new(),
            output_key: None,
            executor: None,
            instruction: None,
            backend: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a state key the task requires.
    pub fn input(mut self, key: impl Into<String>) -> Self {
        self.input_keys.push(key.into());
        self
    }

    pub fn inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Declares a state key the task reads when present.
    pub fn optional_input(mut self, key: impl Into<String>) -> Self {
        self.optional_input_keys.push(key.into());
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.executor = Some(Arc::new(FnExecutor {
            handler: Box::new(move |ctx| Box::pin(handler(ctx))),
        }));
        self
    }

    /// Prompt template; `{key}` and `{key?}` placeholders become declared inputs.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Result<TaskUnit> {
        if self.name.trim().is_empty() {
            return Err(FlowError::Config("Task name must not be empty".to_string()));
        }
        let output_key = self.output_key.ok_or_else(|| {
            FlowError::Config(format!("Task '{}' requires an output key", self.name))
        })?;

        let mut input_keys = self.input_keys;
        let mut optional_input_keys = self.optional_input_keys;

        let executor: Arc<dyn TaskExecutor> = match (self.executor, self.instruction, self.backend)
        {
            (Some(_), Some(_), _) => {
                return Err(FlowError::Config(format!(
                    "Task '{}' has both an executor and an instruction",
                    self.name
                )));
            }
            (Some(executor), None, _) => executor,
            (None, Some(instruction), Some(backend)) => {
                let (required, optional) = template_keys(&instruction);
                input_keys.extend(required);
                optional_input_keys.extend(optional);
                Arc::new(PromptExecutor::new(instruction, backend))
            }
            (None, Some(_), None) => {
                return Err(FlowError::Config(format!(
                    "Task '{}' has an instruction but no backend",
                    self.name
                )));
            }
            (None, None, _) => {
                return Err(FlowError::Config(format!(
                    "Task '{}' requires a handler, executor, or instruction",
                    self.name
                )));
            }
        };

        dedup(&mut input_keys);
        dedup(&mut optional_input_keys);
        optional_input_keys.retain(|key| !input_keys.contains(key));

        for key in input_keys.iter().chain(&optional_input_keys).chain(std::iter::once(&output_key))
        {
            validate_state_key(key).map_err(|e| {
                FlowError::Config(format!("Task '{}': {e}", self.name))
            })?;
        }

        Ok(TaskUnit {
            name: self.name,
            description: self.description,
            input_keys,
            optional_input_keys,
            output_key,
            executor,
        })
    }
}

fn dedup(keys: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    keys.retain(|key| seen.insert(key.clone()));
}
