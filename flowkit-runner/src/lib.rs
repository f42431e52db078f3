//! # flowkit-runner
//!
//! Runs a pipeline from an initial state to a final state.
//!
//! A run validates the pipeline against the initial keys, opens connectors,
//! executes the root node, and closes connectors whatever the outcome.
//!
//! ```rust,ignore
//! let runner = Runner::new(RunnerConfig {
//!     app_name: "reports".to_string(),
//!     pipeline,
//!     connectors: config.connectors(),
//!     run_config: config.run_config(),
//! })?;
//!
//! let output = runner.run(HashMap::from([("topic".to_string(), json!("tides"))])).await?;
//! println!("{}", output.state["draft"]);
//! ```

pub mod config;
mod runner;

pub use config::{ConnectorConfig, FlowConfig, RunSection, TelemetrySection};
pub use runner::{RunOutput, Runner, RunnerConfig};
