//! # flowkit telemetry
//!
//! Structured logging for flowkit pipelines using `tracing`.
//!
//! ## Usage
//!
//! ```rust
//! use flowkit_telemetry::{init_telemetry, info, node_run_span};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_telemetry("report-pipeline")?;
//!
//!     let span = node_run_span("research_phase", "parallel", "inv-1");
//!     let _enter = span.enter();
//!     info!("phase started");
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Instrument, Span, debug, error, info, instrument, trace, warn};

pub use spans::*;

pub use init::{TelemetryFormat, init_json_telemetry, init_telemetry, init_with_filter};
