//! File and environment configuration for pipeline runs.
//!
//! ```toml
//! [run]
//! parallel_grace_ms = 5000
//!
//! [telemetry]
//! filter = "flowkit=debug,info"
//! json = true
//!
//! [[connectors]]
//! name = "fetch"
//! command = "uvx"
//! args = ["mcp-server-fetch"]
//! tool_filter = ["fetch"]
//! ```
//!
//! Environment overrides (a `.env` file is honoured by [`FlowConfig::load`]):
//!
//! - `FLOWKIT_PARALLEL_GRACE_MS` - replaces `run.parallel_grace_ms`
//! - `FLOWKIT_LOG` - replaces `telemetry.filter`
//! - `FLOWKIT_LOG_JSON` - replaces `telemetry.json`

use flowkit_core::{Connector, DEFAULT_PARALLEL_GRACE, FlowError, Result, RunConfig};
use flowkit_telemetry::{TelemetryFormat, init_with_filter};
use flowkit_tool::{McpConnector, StdioServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_PARALLEL_GRACE_MS: &str = "FLOWKIT_PARALLEL_GRACE_MS";
pub const ENV_LOG: &str = "FLOWKIT_LOG";
pub const ENV_LOG_JSON: &str = "FLOWKIT_LOG_JSON";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    pub run: RunSection,
    pub telemetry: TelemetrySection,
    pub connectors: Vec<ConnectorConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub parallel_grace_ms: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self { parallel_grace_ms: DEFAULT_PARALLEL_GRACE.as_millis() as u64 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    /// `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub filter: Option<String>,
    pub json: bool,
}

/// An MCP server to launch for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    #[serde(flatten)]
    pub server: StdioServerConfig,
    #[serde(default)]
    pub tool_filter: Option<Vec<String>>,
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
}

impl FlowConfig {
    /// Reads `.env`, then the TOML file at `path` if given, then environment
    /// overrides, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!(path = %env_file.display(), "Loaded .env");
        }
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| FlowError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FlowError::Config(format!("invalid config: {e}")))
    }

    /// Applies overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PARALLEL_GRACE_MS) {
            self.run.parallel_grace_ms = value.trim().parse().map_err(|_| {
                FlowError::Config(format!("{ENV_PARALLEL_GRACE_MS} must be milliseconds, got '{value}'"))
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.telemetry.filter = Some(filter);
        }
        if let Some(value) = lookup(ENV_LOG_JSON) {
            self.telemetry.json = matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for connector in &self.connectors {
            if connector.name.trim().is_empty() {
                return Err(FlowError::Config("connector name must not be empty".to_string()));
            }
            if connector.server.command.trim().is_empty() {
                return Err(FlowError::Config(format!(
                    "connector '{}' has no command",
                    connector.name
                )));
            }
            if !names.insert(connector.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "Duplicate connector name: {}",
                    connector.name
                )));
            }
        }
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig { parallel_grace: Duration::from_millis(self.run.parallel_grace_ms) }
    }

    /// Builds one [`McpConnector`] per `[[connectors]]` entry, in file order.
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.connectors
            .iter()
            .map(|entry| {
                let mut connector = McpConnector::new(&entry.name, entry.server.clone())
                    .with_tool_filter(entry.tool_filter.clone());
                if let Some(ms) = entry.startup_timeout_ms {
                    connector = connector.with_startup_timeout(Duration::from_millis(ms));
                }
                Arc::new(connector) as Arc<dyn Connector>
            })
            .collect()
    }

    /// Installs the console subscriber described by `[telemetry]`.
    pub fn init_telemetry(&self, service_name: &str) -> Result<()> {
        let format = if self.telemetry.json { TelemetryFormat::Json } else { TelemetryFormat::Pretty };
        init_with_filter(service_name, self.telemetry.filter.as_deref(), format)
            .map_err(|e| FlowError::Config(format!("telemetry: {e}")))
    }
}
