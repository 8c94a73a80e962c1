//! adverify - ad credibility analysis with tool-using Gemini agents
//!
//! This library drives a model through multi-turn tool calls against an
//! MCP patent-search server, then annotates the answer with citations.

pub mod agent;
pub mod analyzer;
pub mod archive;
pub mod config;
pub mod error;
pub mod templates;
pub mod tools;
pub mod ui;

pub use analyzer::{AnalysisReport, Analyzer};
pub use error::{Error, Result};
