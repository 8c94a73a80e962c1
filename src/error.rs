//! Error types for adverify

use thiserror::Error;

/// Result type alias for adverify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during an analysis run.
///
/// Only `Connection` and `Provider` abort a run. `ToolExecution` is produced
/// by tool providers and folded back into the conversation by the connector.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool provider connection error: {0}")]
    Connection(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Model provider error: {0}")]
    Provider(String),

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
