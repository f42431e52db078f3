use crate::{
    Connector, ConnectorRegistry, Event, FlowError, Result, StateStore, StateView,
    TerminationSignal,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Default time a parallel phase keeps waiting for siblings after a branch fails.
pub const DEFAULT_PARALLEL_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// How long a parallel phase waits for remaining branches once one has failed.
    pub parallel_grace: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { parallel_grace: DEFAULT_PARALLEL_GRACE }
    }
}

/// Execution context handed to every node of a pipeline run.
///
/// Composers derive child contexts from it; nothing in a run is reachable
/// through globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    invocation_id: String,
    branch: String,
    state: StateStore,
    signal: Option<TerminationSignal>,
    iteration: Option<u32>,
    cancellation: CancellationToken,
    connectors: Arc<ConnectorRegistry>,
    events: Option<UnboundedSender<Event>>,
    run_config: Arc<RunConfig>,
}

impl RunContext {
    pub fn new(invocation_id: impl Into<String>, state: StateStore) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            branch: String::new(),
            state,
            signal: None,
            iteration: None,
            cancellation: CancellationToken::new(),
            connectors: Arc::new(ConnectorRegistry::default()),
            events: None,
            run_config: Arc::new(RunConfig::default()),
        }
    }

    pub fn with_connectors(mut self, connectors: Arc<ConnectorRegistry>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_event_sink(mut self, sink: UnboundedSender<Event>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.run_config = Arc::new(config);
        self
    }

    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = state;
        self
    }

    /// Context for a child node; extends the branch path with `name`.
    pub fn for_child(&self, name: &str) -> Self {
        let mut child = self.clone();
        child.branch =
            if self.branch.is_empty() { name.to_string() } else { format!("{}.{name}", self.branch) };
        child
    }

    /// Context for one loop iteration carrying that iteration's signal.
    pub fn for_iteration(&self, signal: TerminationSignal, iteration: u32) -> Self {
        let mut child = self.clone();
        child.signal = Some(signal);
        child.iteration = Some(iteration);
        child
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn signal(&self) -> Option<&TerminationSignal> {
        self.signal.as_ref()
    }

    pub fn iteration(&self) -> Option<u32> {
        self.iteration
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Publishes an event to the run's observer, if any.
    pub fn emit(&self, event: Event) {
        if let Some(sink) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = sink.send(event);
        }
    }

    /// Builds the context a task executor sees: inputs restricted to `input_keys`.
    pub fn task_context<S: AsRef<str>>(&self, task_name: &str, input_keys: &[S]) -> TaskContext {
        TaskContext {
            task_name: task_name.to_string(),
            invocation_id: self.invocation_id.clone(),
            inputs: self.state.view(input_keys),
            iteration: self.iteration,
            signal: self.signal.clone(),
            escalated: Arc::new(AtomicBool::new(false)),
            cancellation: self.cancellation.clone(),
            connectors: self.connectors.clone(),
        }
    }
}

/// What a task executor can see and do while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_name: String,
    invocation_id: String,
    inputs: StateView,
    iteration: Option<u32>,
    signal: Option<TerminationSignal>,
    escalated: Arc<AtomicBool>,
    cancellation: CancellationToken,
    connectors: Arc<ConnectorRegistry>,
}

impl TaskContext {
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn inputs(&self) -> &StateView {
        &self.inputs
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.inputs.text(key)
    }

    /// 1-based loop iteration, when running inside a loop.
    pub fn iteration(&self) -> Option<u32> {
        self.iteration
    }

    /// Requests that the innermost enclosing loop stop.
    ///
    /// Outside a loop there is nothing to stop and the request is only recorded.
    pub fn escalate(&self) {
        self.escalated.store(true, Ordering::SeqCst);
        match &self.signal {
            Some(signal) => signal.set(),
            None => tracing::debug!(task = %self.task_name, "escalate outside a loop has no effect"),
        }
    }

    /// Whether this task called [`TaskContext::escalate`].
    pub fn escalated(&self) -> bool {
        self.escalated.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn connector(&self, name: &str) -> Result<Arc<dyn Connector>> {
        self.connectors
            .get(name)
            .ok_or_else(|| FlowError::Connector(format!("Connector '{name}' is not registered")))
    }

    /// Calls `tool` on the connector registered as `connector`.
    pub async fn invoke(&self, connector: &str, tool: &str, args: Value) -> Result<Value> {
        self.connector(connector)?.invoke(tool, args).await
    }
}
