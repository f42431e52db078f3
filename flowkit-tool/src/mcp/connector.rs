use super::content::{call_params, result_value};
use async_trait::async_trait;
use flowkit_core::{Connector, FlowError, Result};
use flowkit_telemetry::{Instrument, connector_call_span};
use rmcp::{
    RoleClient, ServiceExt,
    service::{Peer, RunningService},
    transport::TokioChildProcess,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long `open` waits for the server process to start and initialize.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line of an MCP server spoken to over stdin/stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl StdioServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), ..Default::default() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        cmd
    }
}

/// Connector that launches an MCP server as a child process and proxies
/// `invoke` to the server's `tools/call`.
///
/// # Example
///
/// ```rust,ignore
/// let connector = McpConnector::new(
///     "files",
///     StdioServerConfig::new("npx")
///         .arg("-y")
///         .arg("@modelcontextprotocol/server-filesystem")
///         .arg("/tmp"),
/// )
/// .with_tools(&["read_file", "list_directory"]);
/// ```
pub struct McpConnector {
    name: String,
    server: StdioServerConfig,
    tool_filter: Option<Vec<String>>,
    startup_timeout: Duration,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    tools: RwLock<Vec<String>>,
}

impl McpConnector {
    pub fn new(name: impl Into<String>, server: StdioServerConfig) -> Self {
        Self {
            name: name.into(),
            server,
            tool_filter: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            service: Mutex::new(None),
            tools: RwLock::new(Vec::new()),
        }
    }

    /// Only expose tools with the given names.
    pub fn with_tools(mut self, tool_names: &[&str]) -> Self {
        self.tool_filter = Some(tool_names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_tool_filter(mut self, tool_names: Option<Vec<String>>) -> Self {
        self.tool_filter = tool_names;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn server(&self) -> &StdioServerConfig {
        &self.server
    }

    /// Tools discovered on `open` that pass the filter. Empty until opened.
    pub fn tools(&self) -> Vec<String> {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn allows(&self, tool: &str) -> bool {
        self.tool_filter.as_ref().is_none_or(|names| names.iter().any(|n| n == tool))
    }

    async fn peer(&self) -> Result<Peer<RoleClient>> {
        let service = self.service.lock().await;
        service
            .as_ref()
            .map(|running| running.peer().clone())
            .ok_or_else(|| FlowError::Connector(format!("Connector '{}' is not open", self.name)))
    }

    async fn start(&self) -> Result<RunningService<RoleClient, ()>> {
        let transport = TokioChildProcess::new(self.server.command()).map_err(|e| {
            FlowError::Connector(format!(
                "Failed to launch MCP server '{}' ({}): {e}",
                self.name, self.server.command
            ))
        })?;

        tokio::time::timeout(self.startup_timeout, ().serve(transport))
            .await
            .map_err(|_| {
                FlowError::Connector(format!(
                    "MCP server '{}' startup timed out after {:?}",
                    self.name, self.startup_timeout
                ))
            })?
            .map_err(|e| {
                FlowError::Connector(format!("MCP server '{}' failed to initialize: {e}", self.name))
            })
    }
}

#[async_trait]
impl Connector for McpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<()> {
        let mut service = self.service.lock().await;
        if service.is_some() {
            return Err(FlowError::Connector(format!("Connector '{}' is already open", self.name)));
        }

        let running = self.start().await?;
        let listed = match running.list_all_tools().await {
            Ok(listed) => listed,
            Err(e) => {
                running.cancellation_token().cancel();
                return Err(FlowError::Connector(format!(
                    "Failed to list MCP tools for '{}': {e}",
                    self.name
                )));
            }
        };

        let tools: Vec<String> = listed
            .into_iter()
            .map(|tool| tool.name.to_string())
            .filter(|name| self.allows(name))
            .collect();
        if let Some(filter) = &self.tool_filter {
            for missing in filter.iter().filter(|name| !tools.contains(name)) {
                warn!(connector = %self.name, tool = %missing, "Allowed tool not offered by server");
            }
        }

        info!(connector = %self.name, tools = ?tools, "MCP connector opened");
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
        *service = Some(running);
        Ok(())
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let peer = self.peer().await?;
        if !self.tools().iter().any(|tool| tool == name) {
            return Err(FlowError::Connector(format!(
                "Tool '{name}' is not available on connector '{}'",
                self.name
            )));
        }

        let params = call_params(name, args)?;

        let result = peer
            .call_tool(params)
            .instrument(connector_call_span(&self.name, name))
            .await
            .map_err(|e| FlowError::Connector(format!("MCP call to '{name}' failed: {e}")))?;
        debug!(connector = %self.name, tool = name, is_error = ?result.is_error, "MCP tool returned");
        result_value(name, result)
    }

    async fn close(&self) -> Result<()> {
        let Some(running) = self.service.lock().await.take() else {
            return Ok(());
        };
        self.tools.write().unwrap_or_else(PoisonError::into_inner).clear();
        running
            .cancel()
            .await
            .map_err(|e| FlowError::Connector(format!("Failed to stop MCP server '{}': {e}", self.name)))?;
        info!(connector = %self.name, "MCP connector closed");
        Ok(())
    }
}
