// Conversion of MCP tool results into state values.

use flowkit_core::{FlowError, Result};
use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent, ResourceContents};
use serde_json::{Map, Value};
use std::ops::Deref;

/// Tool arguments must be a JSON object; `null` and `{}` mean "no arguments".
pub(crate) fn call_arguments(tool: &str, args: Value) -> Result<Option<Map<String, Value>>> {
    match args {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        _ => Err(FlowError::Connector(format!("Arguments for '{tool}' must be an object"))),
    }
}

pub(crate) fn call_params(tool: &str, args: Value) -> Result<CallToolRequestParams> {
    let params = CallToolRequestParams::new(tool.to_string());
    Ok(match call_arguments(tool, args)? {
        Some(arguments) => params.with_arguments(arguments),
        None => params,
    })
}

/// Structured content when the server provides it, otherwise the text parts
/// joined by newlines.
pub(crate) fn result_value(tool: &str, result: CallToolResult) -> Result<Value> {
    if result.is_error.unwrap_or(false) {
        let mut message = format!("MCP tool '{tool}' execution failed");
        if let Some(text) = result.content.iter().find_map(|content| content.deref().as_text()) {
            message.push_str(": ");
            message.push_str(&text.text);
        }
        return Err(FlowError::Connector(message));
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let parts: Vec<String> = result
        .content
        .iter()
        .map(|content| match content.deref() {
            RawContent::Text(text) => text.text.clone(),
            RawContent::Image(image) => {
                format!("[Image: {} bytes, mime: {}]", image.data.len(), image.mime_type)
            }
            RawContent::Resource(resource) => {
                let uri = match &resource.resource {
                    ResourceContents::TextResourceContents { uri, .. } => uri,
                    ResourceContents::BlobResourceContents { uri, .. } => uri,
                };
                format!("[Resource: {uri}]")
            }
            RawContent::Audio(_) => "[Audio content]".to_string(),
            RawContent::ResourceLink(link) => format!("[ResourceLink: {}]", link.uri),
        })
        .collect();

    if parts.is_empty() {
        return Err(FlowError::Connector(format!("MCP tool '{tool}' returned no content")));
    }
    Ok(Value::String(parts.join("\n")))
}
