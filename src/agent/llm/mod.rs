//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable model providers
//! - [`LlmResponse`] and [`Usage`], the provider-neutral response shape
//! - [`GeminiClient`], the `generateContent` implementation
//!
//! Provider JSON never leaves this module: responses are normalized into
//! [`ToolRequest`]s, [`Usage`] and [`Grounding`] before the loop sees them.

mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::ToolDefinition;
use crate::Result;

pub use types::*;

pub mod gemini;

pub use gemini::GeminiClient;

use super::citations::Grounding;
use super::message::{ToolRequest, Turn};

/// Response from an LLM provider.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Text content of the response.
    pub text: Option<String>,

    /// Tool calls requested by the model.
    pub tool_requests: Vec<ToolRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics for this call.
    pub usage: Usage,

    /// Search grounding, if the model used it.
    pub grounding: Option<Grounding>,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            finish_reason: "STOP".to_string(),
            ..Default::default()
        }
    }

    /// Create a response that only requests tools.
    pub fn tool_calls(requests: Vec<ToolRequest>) -> Self {
        Self {
            tool_requests: requests,
            finish_reason: "STOP".to_string(),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// Token usage information.
///
/// `total_tokens` always equals `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another call's usage onto this running total.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Prompt: {}, Candidates: {}, Total: {}",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )
    }
}

/// Tools offered to the model on every call.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    /// Function declarations from the tool provider.
    pub declarations: Vec<ToolDefinition>,

    /// Enable the model's built-in search grounding.
    pub google_search: bool,
}

/// LLM client trait - swappable provider abstraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation so far and get the next response.
    async fn generate(&self, turns: &[Turn], tools: &ToolSet) -> Result<LlmResponse>;

    /// Model identifier used for requests.
    fn model(&self) -> &str;
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    seen: std::sync::Mutex<Vec<Vec<Turn>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.iter().map(|s| LlmResponse::text(*s)).collect())
    }

    /// Create with arbitrary scripted responses, returned in order.
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create with scripted results, allowing provider failures.
    pub fn with_results(results: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(results.into()),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Conversations passed to each `generate` call, in order.
    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn generate(&self, turns: &[Turn], _tools: &ToolSet) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(turns.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses.pop_front().unwrap_or_else(|| {
            Err(crate::error::Error::Provider(
                "No more fake responses".to_string(),
            ))
        })
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
