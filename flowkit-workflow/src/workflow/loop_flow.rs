use super::run_in_order;
use async_trait::async_trait;
use flowkit_core::{
    FlowError, LoopState, Node, NodeKind, Result, RunContext, RunReport, StopReason,
    TerminationSignal,
};
use flowkit_telemetry::{Instrument, node_run_span};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default maximum iterations for LoopFlow when none is specified.
pub const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 1000;

/// When a loop looks at its termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitCheck {
    /// Once per iteration, after the last child.
    #[default]
    AfterIteration,
    /// After every child; the rest of the iteration is skipped once the signal is set.
    AfterEachChild,
}

/// Re-runs its children in order until a task raises the termination signal or
/// the iteration cap is reached.
pub struct LoopFlow {
    name: String,
    description: String,
    children: Vec<Arc<dyn Node>>,
    max_iterations: u32,
    exit_check: ExitCheck,
}

impl LoopFlow {
    pub fn builder(name: impl Into<String>) -> LoopFlowBuilder {
        LoopFlowBuilder::new(name)
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn exit_check(&self) -> ExitCheck {
        self.exit_check
    }

    fn transition(&self, state: &mut LoopState, next: LoopState) {
        debug!(from = ?state, to = ?next, "Loop state changed");
        *state = next;
    }

    async fn iterate(&self, ctx: &RunContext) -> Result<RunReport> {
        // Each loop owns its signal so a task only ever stops its innermost loop.
        let signal = TerminationSignal::new();
        let stop_on = match self.exit_check {
            ExitCheck::AfterEachChild => Some(&signal),
            ExitCheck::AfterIteration => None,
        };

        let mut state = LoopState::Idle;
        let mut reports = Vec::new();

        for iteration in 1..=self.max_iterations {
            signal.reset();
            self.transition(&mut state, LoopState::Running { iteration });

            let iteration_ctx = ctx.for_iteration(signal.clone(), iteration);
            let pass_reports = run_in_order(&self.children, &iteration_ctx, stop_on).await?;
            reports.extend(pass_reports);

            if signal.is_set() {
                self.transition(&mut state, LoopState::Stopped(StopReason::Signaled { iteration }));
                break;
            }
        }

        if !state.is_terminal() {
            let iterations = self.max_iterations;
            self.transition(&mut state, LoopState::Stopped(StopReason::CapExhausted { iterations }));
        }

        let LoopState::Stopped(reason) = state else {
            return Err(FlowError::execution(&self.name, "loop ended without a stop reason"));
        };
        Ok(RunReport::composite(&self.name, NodeKind::Loop, reports).with_stop(reason))
    }
}

#[async_trait]
impl Node for LoopFlow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Loop
    }

    fn children(&self) -> &[Arc<dyn Node>] {
        &self.children
    }

    fn guarantees_all_children(&self) -> bool {
        self.exit_check == ExitCheck::AfterIteration
    }

    async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport> {
        let span = node_run_span(&self.name, "loop", ctx.invocation_id());
        async move {
            info!(max_iterations = self.max_iterations, exit_check = ?self.exit_check, "Loop started");
            match self.iterate(&ctx).await {
                Ok(report) => {
                    if let Some(stop) = &report.stop {
                        info!(iterations = stop.iterations(), signaled = stop.is_signaled(), "Loop stopped");
                    }
                    Ok(report)
                }
                Err(e) => {
                    warn!(error = %e, "Loop aborted");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

pub struct LoopFlowBuilder {
    name: String,
    description: String,
    children: Vec<Arc<dyn Node>>,
    max_iterations: u32,
    exit_check: ExitCheck,
}

impl LoopFlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            children: Vec::new(),
            max_iterations: DEFAULT_LOOP_MAX_ITERATIONS,
            exit_check: ExitCheck::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn sub_node(mut self, node: Arc<dyn Node>) -> Self {
        self.children.push(node);
        self
    }

    pub fn sub_nodes(mut self, nodes: impl IntoIterator<Item = Arc<dyn Node>>) -> Self {
        self.children.extend(nodes);
        self
    }

    pub fn max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn exit_check(mut self, exit_check: ExitCheck) -> Self {
        self.exit_check = exit_check;
        self
    }

    pub fn build(self) -> Result<LoopFlow> {
        if self.max_iterations == 0 {
            return Err(FlowError::Config(format!(
                "Loop '{}' needs an iteration cap of at least 1",
                self.name
            )));
        }
        if self.children.is_empty() {
            return Err(FlowError::Config(format!("Loop '{}' has no children", self.name)));
        }
        Ok(LoopFlow {
            name: self.name,
            description: self.description,
            children: self.children,
            max_iterations: self.max_iterations,
            exit_check: self.exit_check,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskUnit;
    use flowkit_core::StateStore;
    use serde_json::json;

    fn counter(name: &str, key: &str) -> Arc<dyn Node> {
        let key_owned = key.to_string();
        Arc::new(
            TaskUnit::builder(name)
                .optional_input(key)
                .output_key(key)
                .handler(move |ctx| {
                    let key = key_owned.clone();
                    async move {
                        let n = ctx.input(&key).and_then(|v| v.as_u64()).unwrap_or(0);
                        Ok(json!(n + 1))
                    }
                })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_zero_cap_is_configuration_error() {
        let result = LoopFlow::builder("refine").sub_node(counter("tick", "n")).max_iterations(0).build();
        assert!(result.err().is_some_and(|e| e.is_configuration()));
    }

    #[test]
    fn test_default_cap() {
        let flow = LoopFlow::builder("refine").sub_node(counter("tick", "n")).build().unwrap();
        assert_eq!(flow.max_iterations(), DEFAULT_LOOP_MAX_ITERATIONS);
        assert_eq!(flow.exit_check(), ExitCheck::AfterIteration);
    }

    #[tokio::test]
    async fn test_cap_exhausted_is_not_an_error() {
        let state = StateStore::new();
        let flow =
            LoopFlow::builder("refine").sub_node(counter("tick", "n")).max_iterations(4).build().unwrap();

        let report = flow.run(Arc::new(RunContext::new("inv", state.clone()))).await.unwrap();
        assert_eq!(report.stop, Some(StopReason::CapExhausted { iterations: 4 }));
        assert_eq!(report.executions("tick"), 4);
        assert_eq!(state.get("n"), Some(json!(4)));
    }
}
