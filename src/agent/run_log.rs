//! Per-run debug log.
//!
//! Every user prompt, model response and tool result is appended as a
//! [`DebugStep`] while the run progresses, then rendered once into a
//! Markdown report that replays the conversation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;
use uuid::Uuid;

use crate::Result;

use super::llm::Usage;
use super::message::ToolRequest;

/// Tool results longer than this are cut in the report
const MAX_RESULT_CHARS: usize = 2000;

/// Who produced a logged call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole {
    User,
    Model,
}

/// Role-specific content of a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    User {
        text: String,
    },
    Model {
        text: Option<String>,
        requests: Vec<ToolRequest>,
    },
    Tool {
        name: String,
        result: String,
    },
    Note {
        text: String,
    },
}

/// One entry of the run log
#[derive(Debug, Clone)]
pub struct DebugStep {
    pub timestamp: DateTime<Local>,
    /// Model turn this step belongs to (0 before the first model response)
    pub turn: usize,
    pub payload: StepPayload,
}

/// Append-only log of one analysis run
#[derive(Debug)]
pub struct RunLogger {
    run_id: Uuid,
    start_time: DateTime<Local>,
    steps: Vec<DebugStep>,
    model_calls: usize,
    tool_calls: usize,
    usage: Option<Usage>,
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLogger {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_time: Local::now(),
            steps: Vec::new(),
            model_calls: 0,
            tool_calls: 0,
            usage: None,
        }
    }

    fn push(&mut self, payload: StepPayload) {
        self.steps.push(DebugStep {
            timestamp: Local::now(),
            turn: self.model_calls,
            payload,
        });
    }

    /// Log a user prompt or a model response
    pub fn log_call(&mut self, role: LogRole, text: Option<&str>, requests: &[ToolRequest]) {
        match role {
            LogRole::User => self.push(StepPayload::User {
                text: text.unwrap_or_default().to_string(),
            }),
            LogRole::Model => {
                self.model_calls += 1;
                self.push(StepPayload::Model {
                    text: text.map(str::to_string),
                    requests: requests.to_vec(),
                });
            }
        }
    }

    /// Log a tool result, attributed to the current model turn
    pub fn log_tool_result(&mut self, name: &str, result: &str) {
        self.tool_calls += 1;
        self.push(StepPayload::Tool {
            name: name.to_string(),
            result: result.to_string(),
        });
    }

    /// Log a condition worth seeing in the report (e.g. budget exhaustion)
    pub fn note(&mut self, text: impl Into<String>) {
        self.push(StepPayload::Note { text: text.into() });
    }

    pub fn set_usage(&mut self, usage: Usage) {
        self.usage = Some(usage);
    }

    pub fn steps(&self) -> &[DebugStep] {
        &self.steps
    }

    pub fn model_calls(&self) -> usize {
        self.model_calls
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }

    /// Render the whole run as Markdown
    pub fn generate_report(&self) -> String {
        let mut report = vec![
            "# Gemini API Flow Debug Log".to_string(),
            format!("- **Run**: {}", self.run_id),
            format!("- **Date**: {}", self.start_time.format("%Y-%m-%d %H:%M:%S")),
            format!("- **Total Gemini API Calls**: {}", self.model_calls),
            format!("- **Total Tool Calls**: {}", self.tool_calls),
        ];

        if let Some(usage) = self.usage {
            report.push(format!("- **Token Usage**: {}", usage));
        }

        report.push("\n## 💬 Communication Flow\n".to_string());

        for step in &self.steps {
            let time = step.timestamp.format("%H:%M:%S");
            match &step.payload {
                StepPayload::User { text } => {
                    report.push(format!("### 👤 User (Input) *[{}]*", time));
                    report.push(format!("```text\n{}\n```\n", text));
                }
                StepPayload::Model { text, requests } => {
                    report.push(format!("### 🤖 Gemini Response (Turn {}) *[{}]*", step.turn, time));
                    match text.as_deref().filter(|t| !t.is_empty()) {
                        Some(text) => report.push(format!("**Thought/Draft**:\n\n{}\n", text)),
                        None => report.push("[Tool Call Only]\n".to_string()),
                    }

                    if !requests.is_empty() {
                        report.push("#### 🛠️ Tool Usage (Function Calls)".to_string());
                        for request in requests {
                            report.push(format!("- **Tool**: `{}`", request.name));
                            report.push(format!(
                                "- **Arguments**:\n```json\n{}\n```",
                                pretty_json(&request.arguments)
                            ));
                        }
                    }
                    report.push("---".to_string());
                }
                StepPayload::Tool { name, result } => {
                    report.push(format!("### 📥 Tool Result (`{}`) *[{}]*", name, time));
                    report.push(format!("```json\n{}\n```\n", truncate_chars(result, MAX_RESULT_CHARS)));
                }
                StepPayload::Note { text } => {
                    report.push(format!("> ⚠️ {} *[{}]*\n", text, time));
                }
            }
        }

        report.join("\n")
    }

    /// Write the report into `dir`, creating it if needed.
    ///
    /// File names carry the start time and run id, and existing files are
    /// never replaced.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let run = self.run_id.simple().to_string();
        let filename = format!(
            "api_flow_{}_{}.md",
            self.start_time.format("%Y%m%d_%H%M%S"),
            &run[..8]
        );
        let path = dir.join(filename);

        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(self.generate_report().as_bytes())?;

        Ok(path)
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_counters_and_turn_attribution() {
        let mut logger = RunLogger::new();
        logger.log_call(LogRole::User, Some("prompt"), &[]);
        logger.log_call(
            LogRole::Model,
            None,
            &[ToolRequest::new("patent_search", json!({"word": "IGF"}))],
        );
        logger.log_tool_result("patent_search", "none");
        logger.log_call(LogRole::Model, Some("final"), &[]);

        assert_eq!(logger.model_calls(), 2);
        assert_eq!(logger.tool_calls(), 1);

        let turns: Vec<usize> = logger.steps().iter().map(|s| s.turn).collect();
        assert_eq!(turns, vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_report_contents() {
        let mut logger = RunLogger::new();
        logger.log_call(LogRole::User, Some("Check this ad"), &[]);
        logger.log_call(
            LogRole::Model,
            None,
            &[ToolRequest::new("patent_search", json!({"word": "IGF"}))],
        );
        logger.log_tool_result("patent_search", "No patents found");
        logger.set_usage(Usage::new(10, 5));

        let report = logger.generate_report();
        assert!(report.contains("**Total Gemini API Calls**: 1"));
        assert!(report.contains("Prompt: 10, Candidates: 5, Total: 15"));
        assert!(report.contains("Check this ad"));
        assert!(report.contains("[Tool Call Only]"));
        assert!(report.contains("`patent_search`"));
        assert!(report.contains("\"word\": \"IGF\""));
    }

    #[test]
    fn test_long_tool_result_truncated() {
        let mut logger = RunLogger::new();
        logger.log_tool_result("patent_search", &"가".repeat(2500));

        let report = logger.generate_report();
        assert!(report.contains("... (truncated)"));
        assert!(!report.contains(&"가".repeat(2001)));
        assert!(report.contains(&"가".repeat(2000)));
    }

    #[test]
    fn test_short_tool_result_not_truncated() {
        assert_eq!(truncate_chars("short", 2000), "short");
    }

    #[test]
    fn test_save_creates_dir_and_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("debug");

        let first = RunLogger::new();
        let second = RunLogger::new();
        let p1 = first.save(&dir).unwrap();
        let p2 = second.save(&dir).unwrap();

        assert_ne!(p1, p2);
        assert!(p1.file_name().unwrap().to_string_lossy().starts_with("api_flow_"));

        // Saving the same run again must not clobber the earlier report
        assert!(first.save(&dir).is_err());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
    }
}
