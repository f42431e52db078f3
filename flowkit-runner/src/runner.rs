use flowkit_core::{
    Connector, ConnectorRegistry, Event, Node, Result, RunConfig, RunContext, RunReport,
    StateStore, validate_pipeline, validate_state_key,
};
use flowkit_telemetry::{Instrument, pipeline_run_span};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct RunnerConfig {
    pub app_name: String,
    pub pipeline: Arc<dyn Node>,
    pub connectors: Vec<Arc<dyn Connector>>,
    pub run_config: RunConfig,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub invocation_id: String,
    pub state: HashMap<String, Value>,
    pub report: RunReport,
    /// One event per completed task execution, in completion order.
    pub events: Vec<Event>,
}

pub struct Runner {
    app_name: String,
    pipeline: Arc<dyn Node>,
    connectors: Arc<ConnectorRegistry>,
    run_config: RunConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        Ok(Self {
            app_name: config.app_name,
            pipeline: config.pipeline,
            connectors: Arc::new(ConnectorRegistry::new(config.connectors)?),
            run_config: config.run_config,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn pipeline(&self) -> &Arc<dyn Node> {
        &self.pipeline
    }

    pub async fn run(&self, initial_state: HashMap<String, Value>) -> Result<RunOutput> {
        self.run_with_cancellation(initial_state, CancellationToken::new()).await
    }

    /// Like [`Runner::run`]; cancelling `token` stops every in-flight task.
    pub async fn run_with_cancellation(
        &self,
        initial_state: HashMap<String, Value>,
        token: CancellationToken,
    ) -> Result<RunOutput> {
        self.run_on(StateStore::from_map(initial_state), token).await
    }

    /// Runs against a caller-owned store.
    ///
    /// Values written before a failure or cancellation stay in `state`, so the
    /// caller can inspect partial progress.
    pub async fn run_on(&self, state: StateStore, token: CancellationToken) -> Result<RunOutput> {
        let invocation_id = format!("inv-{}", uuid::Uuid::new_v4());
        let span = pipeline_run_span(&self.app_name, &invocation_id);
        self.execute(invocation_id, state, token).instrument(span).await
    }

    async fn execute(
        &self,
        invocation_id: String,
        state: StateStore,
        token: CancellationToken,
    ) -> Result<RunOutput> {
        let initial_keys = state.keys();
        for key in &initial_keys {
            validate_state_key(key)?;
        }
        validate_pipeline(self.pipeline.as_ref(), initial_keys)?;

        self.open_connectors().await?;
        info!(pipeline = %self.pipeline.name(), connectors = ?self.connectors.names(), "Run started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = RunContext::new(&invocation_id, state.clone())
            .with_connectors(self.connectors.clone())
            .with_event_sink(tx)
            .with_cancellation(token)
            .with_run_config(self.run_config.clone())
            .for_child(self.pipeline.name());

        let outcome = self.pipeline.run(Arc::new(ctx)).await;
        let closed = self.close_connectors().await;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, failed_node = ?e.failed_node(), "Run failed");
                return Err(e);
            }
        };
        closed?;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        info!(events = events.len(), keys = state.len(), "Run finished");

        Ok(RunOutput { invocation_id, state: state.snapshot(), report, events })
    }

    async fn open_connectors(&self) -> Result<()> {
        for (index, connector) in self.connectors.all().iter().enumerate() {
            if let Err(e) = connector.open().await {
                warn!(connector = %connector.name(), error = %e, "Connector failed to open");
                for opened in self.connectors.all()[..index].iter().rev() {
                    if let Err(close_err) = opened.close().await {
                        warn!(connector = %opened.name(), error = %close_err, "Connector failed to close");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Closes every connector in reverse order; reports the first failure.
    async fn close_connectors(&self) -> Result<()> {
        let mut first_error = None;
        for connector in self.connectors.all().iter().rev() {
            if let Err(e) = connector.close().await {
                warn!(connector = %connector.name(), error = %e, "Connector failed to close");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
