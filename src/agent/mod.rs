//! Agent module - the model/tool orchestration core.
//!
//! This module contains:
//! - Conversation turns and their ordering rules
//! - LLM client trait and the Gemini implementation
//! - Agent loop driving model and tool turns
//! - Per-run context and debug log
//! - Citation markers from grounding metadata

mod citations;
mod context;
mod loop_impl;
mod message;
mod run_log;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use citations::{add_citations, Grounding, GroundingChunk, GroundingSpan};
pub use context::RunContext;
pub use llm::{GeminiClient, LlmClient, LlmResponse, ToolSet, Usage};
pub use loop_impl::{AgentLoop, LoopOutcome, Termination, NO_RESULT_TEXT};
pub use message::{ConversationState, ToolRequest, ToolResultEntry, Turn};
pub use run_log::{DebugStep, LogRole, RunLogger, StepPayload};

#[cfg(test)]
pub use llm::FakeLlmClient;
