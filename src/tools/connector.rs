//! Tool connector - the agent loop's handle on one tool provider session

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::Result;

use super::{sanitize_schema, MockPatentProvider, StdioToolProvider, ToolDefinition, ToolOutput, ToolProvider};

/// Values shipped in sample `.env` files that are not real keys
const PLACEHOLDER_KEYS: &[&str] = &["", "your_key_here", "YOUR_API_KEY"];

/// Whether an API key is missing or a known placeholder
pub fn is_placeholder_key(key: &str) -> bool {
    PLACEHOLDER_KEYS.contains(&key.trim())
}

/// Manages one provider session for a single analysis run.
///
/// Not shared between runs: each run builds its own connector.
pub struct ToolConnector {
    provider: Box<dyn ToolProvider>,
}

impl ToolConnector {
    pub fn new(provider: impl ToolProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
        }
    }

    /// Build the patent-search connector, falling back to the mock provider
    /// when `force_mock` is set or no usable API key is configured.
    pub fn from_config(config: &Config, force_mock: bool) -> Self {
        let server = &config.patent_server;

        if force_mock {
            info!("Using mock KIPRIS provider");
            return Self::new(MockPatentProvider::new());
        }

        if is_placeholder_key(&server.api_key) {
            warn!("No valid KIPRIS API key found, using mock KIPRIS provider");
            return Self::new(MockPatentProvider::new());
        }

        let provider = StdioToolProvider::new(server.command.clone(), server.args.clone())
            .env("KIPRIS_API_KEY", server.api_key.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs));
        Self::new(provider)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_connected()
    }

    /// Open the provider session if it isn't open yet
    pub async fn connect(&mut self) -> Result<()> {
        if self.provider.is_connected() {
            return Ok(());
        }

        debug!("Connecting to tool provider: {}", self.provider.name());
        self.provider.connect().await.map_err(|e| match e {
            Error::Connection(msg) => Error::Connection(msg),
            other => Error::Connection(other.to_string()),
        })
    }

    /// List tools with schemas sanitized for function declarations
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        self.connect().await?;

        let tools = self.provider.list_tools().await?;
        info!("Tool provider {} offers {} tools", self.provider.name(), tools.len());

        Ok(tools
            .into_iter()
            .map(|tool| ToolDefinition {
                parameters: sanitize_schema(&tool.parameters),
                ..tool
            })
            .collect())
    }

    /// Execute a tool. Failures come back as an error output, never as `Err`,
    /// so the model can be told the tool failed.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> ToolOutput {
        if let Err(e) = self.connect().await {
            warn!("Tool {} unavailable: {}", name, e);
            return ToolOutput::error(format!("Error: {}", e));
        }

        match self.provider.call_tool(name, arguments).await {
            Ok(output) => {
                if output.is_error {
                    debug!("Tool {} reported an error", name);
                }
                output
            }
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                ToolOutput::error(format!("Error: {}", e))
            }
        }
    }

    /// Close the provider session; safe to call more than once
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.provider.disconnect().await {
            warn!("Failed to disconnect tool provider {}: {}", self.provider.name(), e);
        }
    }
}
