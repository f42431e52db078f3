use crate::{Result, RunContext, StopReason};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Task,
    Sequential,
    Parallel,
    Loop,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Task => "task",
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Loop => "loop",
        };
        f.write_str(label)
    }
}

/// A pipeline node: a task unit or one of the composers.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> NodeKind;

    fn children(&self) -> &[Arc<dyn Node>];

    /// State keys the node must find before it runs. Only tasks declare any.
    fn input_keys(&self) -> &[String] {
        &[]
    }

    /// Whether a successful run of this node runs every child at least once.
    ///
    /// Only loops that stop mid-iteration on the termination signal return `false`.
    fn guarantees_all_children(&self) -> bool {
        true
    }

    /// Every state key the node or its descendants may write.
    fn output_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for child in self.children() {
            for key in child.output_keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport>;
}

/// What a node did during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub node: String,
    pub kind: NodeKind,
    /// Child reports in execution order. For loops, all iterations back to back;
    /// for parallel phases, in child declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RunReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopReason>,
}

impl RunReport {
    pub fn task(node: impl Into<String>) -> Self {
        Self { node: node.into(), kind: NodeKind::Task, children: Vec::new(), stop: None }
    }

    pub fn composite(node: impl Into<String>, kind: NodeKind, children: Vec<RunReport>) -> Self {
        Self { node: node.into(), kind, children, stop: None }
    }

    pub fn with_stop(mut self, stop: StopReason) -> Self {
        self.stop = Some(stop);
        self
    }

    /// First report for `name`, searching depth-first.
    pub fn find(&self, name: &str) -> Option<&RunReport> {
        if self.node == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// How many times a node called `name` ran.
    pub fn executions(&self, name: &str) -> usize {
        let own = usize::from(self.node == name);
        own + self.children.iter().map(|child| child.executions(name)).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlowError, StateStore};

    struct Leaf {
        name: String,
        output: String,
    }

    #[async_trait]
    impl Node for Leaf {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "leaf"
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Task
        }

        fn children(&self) -> &[Arc<dyn Node>] {
            &[]
        }

        fn output_keys(&self) -> Vec<String> {
            vec![self.output.clone()]
        }

        async fn run(&self, _ctx: Arc<RunContext>) -> Result<RunReport> {
            Err(FlowError::execution(&self.name, "not runnable"))
        }
    }

    struct Group {
        children: Vec<Arc<dyn Node>>,
    }

    #[async_trait]
    impl Node for Group {
        fn name(&self) -> &str {
            "group"
        }

        fn description(&self) -> &str {
            ""
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Sequential
        }

        fn children(&self) -> &[Arc<dyn Node>] {
            &self.children
        }

        async fn run(&self, _ctx: Arc<RunContext>) -> Result<RunReport> {
            Ok(RunReport::composite("group", NodeKind::Sequential, Vec::new()))
        }
    }

    #[test]
    fn test_default_output_keys_union_children() {
        let group = Group {
            children: vec![
                Arc::new(Leaf { name: "a".into(), output: "x".into() }),
                Arc::new(Leaf { name: "b".into(), output: "y".into() }),
                Arc::new(Leaf { name: "c".into(), output: "x".into() }),
            ],
        };
        assert_eq!(group.output_keys(), vec!["x".to_string(), "y".to_string()]);
        assert!(group.input_keys().is_empty());
    }

    #[tokio::test]
    async fn test_leaf_failure_names_node() {
        let leaf = Leaf { name: "a".into(), output: "x".into() };
        let ctx = Arc::new(RunContext::new("inv", StateStore::new()));
        let err = leaf.run(ctx).await.unwrap_err();
        assert_eq!(err.failed_node(), Some("a"));
    }

    #[test]
    fn test_report_lookup() {
        let report = RunReport::composite(
            "loop",
            NodeKind::Loop,
            vec![RunReport::task("reviewer"), RunReport::task("editor"), RunReport::task("reviewer")],
        )
        .with_stop(StopReason::Signaled { iteration: 2 });

        assert_eq!(report.executions("reviewer"), 2);
        assert_eq!(report.executions("editor"), 1);
        assert_eq!(report.find("loop").and_then(|r| r.stop), Some(StopReason::Signaled { iteration: 2 }));
        assert!(report.find("drafting").is_none());
    }

    #[test]
    fn test_node_kind_display() {
        assert_eq!(NodeKind::Parallel.to_string(), "parallel");
        assert_eq!(NodeKind::Loop.to_string(), "loop");
    }
}
