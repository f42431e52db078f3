use super::run_in_order;
use async_trait::async_trait;
use flowkit_core::{Node, NodeKind, Result, RunContext, RunReport};
use flowkit_telemetry::{Instrument, node_run_span};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs its children once, in order. The first failure aborts the rest and
/// propagates unchanged.
pub struct SequentialFlow {
    name: String,
    description: String,
    children: Vec<Arc<dyn Node>>,
}

impl SequentialFlow {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Node>>) -> Self {
        Self { name: name.into(), description: String::new(), children }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

#[async_trait]
impl Node for SequentialFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Sequential
    }

    fn children(&self) -> &[Arc<dyn Node>] {
        &self.children
    }

    async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport> {
        let span = node_run_span(&self.name, "sequential", ctx.invocation_id());
        async move {
            info!(children = self.children.len(), "Sequential flow started");
            match run_in_order(&self.children, &ctx, None).await {
                Ok(reports) => {
                    info!("Sequential flow finished");
                    Ok(RunReport::composite(&self.name, NodeKind::Sequential, reports))
                }
                Err(e) => {
                    warn!(error = %e, "Sequential flow aborted");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
