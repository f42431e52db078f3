use async_trait::async_trait;
use flowkit_core::{Connector, FlowError, Result};
use flowkit_telemetry::{Instrument, connector_call_span};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

type AsyncHandler =
    Box<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Connector backed by in-process async functions.
pub struct FunctionConnector {
    name: String,
    functions: BTreeMap<String, AsyncHandler>,
    open: AtomicBool,
}

impl FunctionConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: BTreeMap::new(), open: AtomicBool::new(false) }
    }

    pub fn with_function<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.functions.insert(name.into(), Box::new(move |args| Box::pin(handler(args))));
        self
    }

    /// Registered function names, sorted.
    pub fn tools(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FunctionConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        if !self.is_open() {
            return Err(FlowError::Connector(format!("Connector '{}' is not open", self.name)));
        }
        let handler = self.functions.get(name).ok_or_else(|| {
            FlowError::Connector(format!("Connector '{}' has no tool '{name}'", self.name))
        })?;
        handler(args).instrument(connector_call_span(&self.name, name)).await
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> FunctionConnector {
        FunctionConnector::new("local")
            .with_function("echo", |args| async move { Ok(json!({ "echo": args })) })
            .with_function("add", |args| async move {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(json!(a + b))
            })
    }

    #[tokio::test]
    async fn test_invoke_requires_open() {
        let connector = echo();
        let err = connector.invoke("echo", json!(1)).await.unwrap_err();
        assert!(err.to_string().contains("not open"));

        connector.open().await.unwrap();
        assert_eq!(connector.invoke("add", json!({"a": 2, "b": 3})).await.unwrap(), json!(5));

        connector.close().await.unwrap();
        assert!(connector.invoke("add", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let connector = echo();
        connector.open().await.unwrap();
        let err = connector.invoke("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, FlowError::Connector(_)));
    }

    #[test]
    fn test_tools_are_sorted() {
        assert_eq!(echo().tools(), vec!["add".to_string(), "echo".to_string()]);
    }
}
