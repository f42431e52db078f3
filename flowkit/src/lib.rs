//! # flowkit
//!
//! Deterministic workflow orchestration for Rust.
//!
//! A pipeline is a tree of nodes. Leaves are task units that read declared
//! keys from a shared state store and write exactly one output key; inner
//! nodes run their children in sequence, concurrently, or in a loop that
//! stops on an explicit termination signal or an iteration cap.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowkit::prelude::*;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<()> {
//! let research = ParallelFlow::new(
//!     "research",
//!     vec![
//!         Arc::new(TaskUnit::builder("a").output_key("x")
//!             .handler(|_ctx| async { Ok(json!("facts")) }).build()?),
//!         Arc::new(TaskUnit::builder("b").output_key("y")
//!             .handler(|_ctx| async { Ok(json!("examples")) }).build()?),
//!     ],
//! )?;
//! let combine = TaskUnit::builder("c")
//!     .inputs(["x", "y"])
//!     .output_key("z")
//!     .handler(|ctx| async move {
//!         Ok(json!(format!("{} + {}", ctx.text("x").unwrap_or_default(), ctx.text("y").unwrap_or_default())))
//!     })
//!     .build()?;
//!
//! let runner = Runner::new(RunnerConfig {
//!     app_name: "quickstart".to_string(),
//!     pipeline: Arc::new(SequentialFlow::new("pipeline", vec![Arc::new(research), Arc::new(combine)])),
//!     connectors: Vec::new(),
//!     run_config: RunConfig::default(),
//! })?;
//! let output = runner.run(HashMap::new()).await?;
//! assert_eq!(output.state["z"], json!("facts + examples"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! | Feature | Crate | Default |
//! |---------|-------|---------|
//! | `workflow` | `flowkit-workflow` | yes |
//! | `tools` | `flowkit-tool` | yes |
//! | `runner` | `flowkit-runner` | yes |
//! | `telemetry` | `flowkit-telemetry` | yes |

pub use flowkit_core::*;

// Re-export common dependencies for convenience
pub use async_trait::async_trait;
pub use serde_json;
pub use tokio;
pub use tokio_util::sync::CancellationToken;

/// Task units, composers, and loop control.
#[cfg(feature = "workflow")]
pub mod workflow {
    pub use flowkit_workflow::*;
}

/// Connectors to external tool servers.
#[cfg(feature = "tools")]
pub mod tool {
    pub use flowkit_tool::*;
}

/// Pipeline execution and configuration.
#[cfg(feature = "runner")]
pub mod runner {
    pub use flowkit_runner::*;
}

/// Logging setup and span helpers.
#[cfg(feature = "telemetry")]
pub mod telemetry {
    pub use flowkit_telemetry::*;
}

/// Convenience prelude for common imports.
pub mod prelude {
    pub use crate::{
        Connector, Event, FlowError, ModelBackend, Node, NodeKind, Result, RunConfig,
        RunContext, RunReport, StateStore, StopReason, TaskContext, TerminationSignal,
        validate_pipeline,
    };

    #[cfg(feature = "workflow")]
    pub use crate::workflow::{
        ExitCheck, LoopFlow, ParallelFlow, SequentialFlow, TaskExecutor, TaskUnit, exit_loop,
    };

    #[cfg(feature = "tools")]
    pub use crate::tool::{FunctionConnector, McpConnector, StdioServerConfig};

    #[cfg(feature = "runner")]
    pub use crate::runner::{FlowConfig, RunOutput, Runner, RunnerConfig};

    pub use crate::CancellationToken;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
