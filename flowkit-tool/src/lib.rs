//! # flowkit-tool
//!
//! Connectors that give pipeline tasks access to external capabilities.
//!
//! - [`FunctionConnector`] - Named async Rust functions, for tests and embedding
//! - [`McpConnector`] - An MCP server launched as a child process over stdio
//!
//! Connectors are opened by the runner before the pipeline starts and closed
//! after it finishes. Tasks reach them through
//! [`TaskContext::invoke`](flowkit_core::TaskContext::invoke):
//!
//! ```rust,ignore
//! let fetch = McpConnector::new(
//!     "fetch",
//!     StdioServerConfig::new("uvx").arg("mcp-server-fetch"),
//! )
//! .with_tools(&["fetch"]);
//!
//! TaskUnit::builder("overview")
//!     .input("url")
//!     .output_key("overview")
//!     .handler(|ctx| async move {
//!         let url = ctx.text("url").unwrap_or_default();
//!         ctx.invoke("fetch", "fetch", json!({ "url": url })).await
//!     })
//!     .build()?;
//! ```

mod function_connector;
pub mod mcp;

pub use flowkit_core::Connector;
pub use function_connector::FunctionConnector;
pub use mcp::{DEFAULT_STARTUP_TIMEOUT, McpConnector, StdioServerConfig};
