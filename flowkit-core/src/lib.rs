//! # flowkit-core
//!
//! Core traits and types for flowkit pipelines.
//!
//! ## Overview
//!
//! - [`Node`] - The common interface of task units and composers
//! - [`StateStore`] / [`StateView`] - The shared state every node reads and writes
//! - [`RunContext`] / [`TaskContext`] - Explicit per-run and per-task context
//! - [`TerminationSignal`] - How a task asks its enclosing loop to stop
//! - [`Connector`] - External tool servers opened and closed around a run
//! - [`FlowError`] / [`Result`] - Unified error handling
//!
//! ## Node
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait Node: Send + Sync {
//!     fn name(&self) -> &str;
//!     fn kind(&self) -> NodeKind;
//!     fn children(&self) -> &[Arc<dyn Node>];
//!     async fn run(&self, ctx: Arc<RunContext>) -> Result<RunReport>;
//! }
//! ```
//!
//! ## State
//!
//! State keys may carry a scope prefix for organization:
//!
//! - `user:` - User preferences
//! - `app:` - Application-wide values
//! - `temp:` - Scratch data

pub mod connector;
pub mod context;
pub mod error;
pub mod event;
pub mod instruction_template;
pub mod model;
pub mod node;
pub mod signal;
pub mod state;
pub mod validate;

pub use connector::{Connector, ConnectorRegistry};
pub use context::{DEFAULT_PARALLEL_GRACE, RunConfig, RunContext, TaskContext};
pub use error::{FlowError, NodeFailure, Result};
pub use event::{Event, EventActions};
pub use instruction_template::{inject_state, template_keys};
pub use model::ModelBackend;
pub use node::{Node, NodeKind, RunReport};
pub use signal::{LoopState, StopReason, TerminationSignal};
pub use state::{
    KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER, MAX_STATE_KEY_LEN, StateStore, StateView,
    validate_state_key,
};
pub use validate::validate_pipeline;
