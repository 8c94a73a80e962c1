//! Tools module - external verification tools
//!
//! Tools live in an out-of-process provider (an MCP server speaking JSON-RPC
//! over stdio) or, when no credential is configured, in the in-process mock.
//! [`ToolConnector`] is the only type the agent loop talks to.

mod connector;
mod mock;
mod schema;
mod stdio;

pub use connector::{is_placeholder_key, ToolConnector};
pub use mock::MockPatentProvider;
pub use schema::sanitize_schema;
pub use stdio::StdioToolProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::Result;

/// Tool definition for LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One segment of a tool's result payload
#[derive(Debug, Clone, PartialEq)]
pub enum ContentSegment {
    Text(String),
    /// Non-text content (images, resources) kept as raw JSON
    Other(Value),
}

/// Result payload of a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ContentSegment>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentSegment::Text(text.into())],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentSegment::Text(text.into())],
            is_error: true,
        }
    }

    /// Flatten the segments into the text handed back to the model
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(|segment| match segment {
                ContentSegment::Text(text) => text.clone(),
                ContentSegment::Other(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Tool provider - one session with a source of callable tools
#[async_trait]
pub trait ToolProvider: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether a session is currently open
    fn is_connected(&self) -> bool;

    /// Open the session
    async fn connect(&mut self) -> Result<()>;

    /// List tools with their raw parameter schemas
    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>>;

    /// Execute a tool by name
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolOutput>;

    /// Close the session; must be safe to call repeatedly
    async fn disconnect(&mut self) -> Result<()>;
}

/// Scripted tool provider for testing
#[cfg(test)]
pub struct FakeToolProvider {
    pub tools: Vec<ToolDefinition>,
    /// Per-tool results; a tool with no entry fails with a provider error
    pub results: std::collections::HashMap<String, String>,
    pub calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    pub disconnects: std::sync::Arc<std::sync::Mutex<usize>>,
    pub fail_connect: bool,
    connected: bool,
}

#[cfg(test)]
impl FakeToolProvider {
    pub fn new(results: &[(&str, &str)]) -> Self {
        Self {
            tools: results
                .iter()
                .map(|(name, _)| ToolDefinition {
                    name: name.to_string(),
                    description: format!("Fake {}", name),
                    parameters: serde_json::json!({"type": "object"}),
                })
                .collect(),
            results: results
                .iter()
                .map(|(name, result)| (name.to_string(), result.to_string()))
                .collect(),
            calls: Default::default(),
            disconnects: Default::default(),
            fail_connect: false,
            connected: false,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ToolProvider for FakeToolProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(crate::error::Error::Connection("fake refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&mut self, name: &str, _arguments: Value) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(name.to_string());
        self.results
            .get(name)
            .map(ToolOutput::text)
            .ok_or_else(|| crate::error::Error::ToolExecution(format!("{} exploded", name)))
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.disconnects.lock().unwrap() += 1;
        self.connected = false;
        Ok(())
    }
}
