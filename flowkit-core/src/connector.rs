use crate::{FlowError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// External capability provider (tool server, subprocess, remote service).
///
/// The runner calls [`Connector::open`] before the pipeline starts and
/// [`Connector::close`] after it finishes, whatever the outcome.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self) -> Result<()>;

    async fn invoke(&self, name: &str, args: Value) -> Result<Value>;

    async fn close(&self) -> Result<()>;
}

/// Connectors available to the tasks of one run, addressed by name.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Vec<Arc<dyn Connector>>,
    by_name: HashMap<String, usize>,
}

impl ConnectorRegistry {
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(connectors.len());
        for (index, connector) in connectors.iter().enumerate() {
            if by_name.insert(connector.name().to_string(), index).is_some() {
                return Err(FlowError::Config(format!(
                    "Duplicate connector name: {}",
                    connector.name()
                )));
            }
        }
        Ok(Self { connectors, by_name })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.by_name.get(name).map(|index| self.connectors[*index].clone())
    }

    /// Connectors in registration order.
    pub fn all(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn names(&self) -> Vec<&str> {
        self.connectors.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry").field("connectors", &self.names()).finish()
    }
}
