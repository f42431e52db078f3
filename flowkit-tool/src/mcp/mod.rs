mod connector;
mod content;

pub use connector::{DEFAULT_STARTUP_TIMEOUT, McpConnector, StdioServerConfig};
