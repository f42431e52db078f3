use async_trait::async_trait;
use flowkit_core::{
    FlowError, Node, NodeFailure, NodeKind, Result, RunContext, RunReport, StateStore,
};
use flowkit_telemetry::{Instrument, node_run_span};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs its children concurrently, each against its own fork of the state.
///
/// Children never observe each other's writes. Once every child is done, the
/// forks are merged back in declaration order. Failures are collected and
/// reported together as [`FlowError::Aggregate`].
pub struct ParallelFlow {
    name: String,
    description: String,
    children: Vec<Arc<dyn Node>>,
}

impl ParallelFlow {
    /// # Errors
    ///
    /// Returns [`FlowError::Config`] if two children may write the same key.
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Node>>) -> Result<Self> {
        let name = name.into();
        let mut writers: HashMap<String, String> = HashMap::new();
        for child in &children {
            for key in child.output_keys() {
                if let Some(other) = writers.insert(key.clone(), child.name().to_string()) {
                    return Err(FlowError::Config(format!(
                        "Parallel flow '{name}': '{other}' and '{}' both write '{key}'",
                        child.name()
                    )));
                }
            }
        }
        Ok(Self { name, description: String::new(), children })
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    async fn fan_out(&self, ctx: &RunContext) -> Result<RunReport> {
        let total = self.children.len();
        let grace = ctx.run_config().parallel_grace;
        let phase_token = ctx.cancellation_token().child_token();

        let mut forks: Vec<StateStore> = Vec::with_capacity(total);
        let mut pending = FuturesUnordered::new();
        for (index, child) in self.children.iter().enumerate() {
            let fork = ctx.state().fork();
            forks.push(fork.clone());
            let child_ctx = Arc::new(
                ctx.for_child(child.name())
                    .with_state(fork)
                    .with_cancellation(phase_token.child_token()),
            );
            let child = child.clone();
            pending.push(async move { (index, child.run(child_ctx).await) });
        }

        let mut outcomes: Vec<Option<Result<RunReport>>> = (0..total).map(|_| None).collect();
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                None => pending.next().await,
                Some(at) => match tokio::time::timeout_at(at, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => break,
                },
            };
            let Some((index, outcome)) = next else { break };

            if let Err(e) = &outcome {
                debug!(child = %self.children[index].name(), error = %e, "Parallel branch failed");
                if deadline.is_none() && !e.is_cancelled() {
                    deadline = Some(Instant::now() + grace);
                    warn!(
                        child = %self.children[index].name(),
                        grace_ms = grace.as_millis() as u64,
                        "Parallel branch failed, waiting for remaining branches"
                    );
                }
            }
            outcomes[index] = Some(outcome);
        }

        if !pending.is_empty() {
            warn!(stragglers = pending.len(), "Grace period elapsed, cancelling remaining branches");
            phase_token.cancel();
        }
        drop(pending);

        // No rollback: whatever each branch wrote becomes visible, failed branches included.
        for fork in &forks {
            ctx.state().merge(fork.changes());
        }

        if ctx.cancellation_token().is_cancelled() {
            return Err(FlowError::Cancelled { node: self.name.clone() });
        }

        let mut reports = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (child, outcome) in self.children.iter().zip(outcomes) {
            match outcome {
                Some(Ok(report)) => reports.push(report),
                Some(Err(error)) => {
                    failures.push(NodeFailure { node: child.name().to_string(), error })
                }
                None => failures.push(NodeFailure {
                    node: child.name().to_string(),
                    error: FlowError::Timeout { node: child.name().to_string(), after: grace },
                }),
            }
        }

        if !failures.is_empty() {
            return Err(FlowError::Aggregate { node: self.name.clone(), total, failures });
        }
        Ok(RunReport::composite(&self.name, NodeKind::Parallel, reports))
    }
}

#[async_trait]
impl Node for ParallelFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Parallel
    }

    fn children(&self) -> &[Arc<dyn Node>] {
        &self.children
    }

    async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport> {
        let span = node_run_span(&self.name, "parallel", ctx.invocation_id());
        async move {
            info!(branches = self.children.len(), "Parallel flow started");
            let result = self.fan_out(&ctx).await;
            match &result {
                Ok(_) => info!("Parallel flow finished"),
                Err(e) => warn!(error = %e, "Parallel flow failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
