//! Conversation turns and the per-run transcript

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: Value,

    /// Opaque signature the provider expects echoed back with the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            thought_signature: None,
        }
    }
}

/// Result of one tool invocation, fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEntry {
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResultEntry {
    pub fn success(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// One exchange unit in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Model {
        text: Option<String>,
        requests: Vec<ToolRequest>,
    },
    ToolResults {
        results: Vec<ToolResultEntry>,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn model(text: Option<String>, requests: Vec<ToolRequest>) -> Self {
        Turn::Model { text, requests }
    }

    pub fn tool_results(results: Vec<ToolResultEntry>) -> Self {
        Turn::ToolResults { results }
    }
}

/// Ordered, append-only transcript owned by a single run.
///
/// A `ToolResults` turn is only accepted directly after a `Model` turn that
/// requested tools, and never with more entries than that turn had requests.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Start a conversation with the first user turn
    pub fn seeded(text: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user(text)],
        }
    }

    /// Append a turn, rejecting tool results that don't answer the previous model turn
    pub fn push(&mut self, turn: Turn) -> Result<()> {
        if let Turn::ToolResults { results } = &turn {
            if results.is_empty() {
                return Err(Error::Conversation(
                    "tool result turn must not be empty".to_string(),
                ));
            }

            match self.turns.last() {
                Some(Turn::Model { requests, .. }) if !requests.is_empty() => {
                    if results.len() > requests.len() {
                        return Err(Error::Conversation(format!(
                            "{} tool results for {} requests",
                            results.len(),
                            requests.len()
                        )));
                    }

                    // Results must follow request order (skipped requests leave gaps)
                    let mut pending = requests.iter();
                    for result in results {
                        if !pending.any(|r| r.name == result.name) {
                            return Err(Error::Conversation(format!(
                                "tool result '{}' has no matching request",
                                result.name
                            )));
                        }
                    }
                }
                _ => {
                    return Err(Error::Conversation(
                        "tool results must follow a model turn with tool requests".to_string(),
                    ));
                }
            }
        }

        self.turns.push(turn);
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}
