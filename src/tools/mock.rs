//! In-process patent search provider.
//!
//! Stands in for the KIPRIS MCP server when no API key is configured, so an
//! analysis can still exercise the tool-calling path end to end.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;
use crate::Result;

use super::{ToolDefinition, ToolOutput, ToolProvider};

struct MockPatent {
    number: &'static str,
    title: &'static str,
    title_en: &'static str,
    applicant: &'static str,
    status: &'static str,
}

const PATENTS: &[MockPatent] = &[
    MockPatent {
        number: "10-2015-0041234",
        title: "인삼 열매 추출물을 함유하는 성장촉진용 조성물",
        title_en: "Composition for accelerating the growth containing ginseng berry extracts",
        applicant: "Korea Ginseng Research Institute",
        status: "registered",
    },
    MockPatent {
        number: "10-2018-0112233",
        title: "백수오 및 한속단 추출복합물을 포함하는 성장촉진 조성물의 제조방법",
        title_en: "Manufacturing method of Composition for Promoting Growth comprising Extract of Cynanchum Wilfordii and Phlomis umbrosa",
        applicant: "Daejeon University Industry-Academic Cooperation Foundation",
        status: "registered",
    },
    MockPatent {
        number: "10-2021-0087654",
        title: "인공지능 기반의 의료 데이터 중개 서비스 제공 방법, 서버 및 프로그램",
        title_en: "Method, server and program for providing medical data brokerage services based on AI",
        applicant: "Medibridge Co., Ltd.",
        status: "published",
    },
];

/// Mock KIPRIS provider backed by a small fixed dataset
#[derive(Default)]
pub struct MockPatentProvider {
    connected: bool,
}

impl MockPatentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn search(arguments: &Value) -> Result<ToolOutput> {
        let word = arguments
            .get("word")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| Error::ToolExecution("Missing 'word' parameter".to_string()))?;
        let max_results = arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(10) as usize;

        let needle = word.to_lowercase();
        let matches: Vec<Value> = PATENTS
            .iter()
            .filter(|p| {
                p.title.contains(word)
                    || p.title_en.to_lowercase().contains(&needle)
                    || p.applicant.to_lowercase().contains(&needle)
            })
            .take(max_results)
            .map(|p| {
                json!({
                    "application_number": p.number,
                    "title": p.title,
                    "title_en": p.title_en,
                    "applicant": p.applicant,
                    "status": p.status,
                })
            })
            .collect();

        if matches.is_empty() {
            return Ok(ToolOutput::text(format!("No patents found for '{}'", word)));
        }

        Ok(ToolOutput::text(serde_json::to_string_pretty(&json!({
            "total": matches.len(),
            "patents": matches,
        }))?))
    }

    fn detail(arguments: &Value) -> Result<ToolOutput> {
        let number = arguments
            .get("application_number")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ToolExecution("Missing 'application_number' parameter".to_string()))?;

        match PATENTS.iter().find(|p| p.number == number) {
            Some(p) => Ok(ToolOutput::text(format!(
                "Application {}\nTitle: {} ({})\nApplicant: {}\nStatus: {}",
                p.number, p.title, p.title_en, p.applicant, p.status
            ))),
            None => Ok(ToolOutput::error(format!("Application {} not found", number))),
        }
    }
}

#[async_trait]
impl ToolProvider for MockPatentProvider {
    fn name(&self) -> &str {
        "mock-kipris"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDefinition>> {
        Ok(vec![
            ToolDefinition {
                name: "patent_search".to_string(),
                description: "Search Korean patents (KIPRIS) by keyword, title or applicant".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "word": {"type": "string", "description": "Search keyword"},
                        "max_results": {"type": "integer", "description": "Maximum results (default 10)"},
                        "sort_order": {"type": "string", "enum": ["", "asc", "desc"]}
                    },
                    "required": ["word", "page"]
                }),
            },
            ToolDefinition {
                name: "patent_detail".to_string(),
                description: "Get details of a patent by application number".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "application_number": {"type": "string"}
                    },
                    "required": ["application_number"]
                }),
            },
        ])
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<ToolOutput> {
        debug!("Mock patent tool: {} {}", name, arguments);
        match name {
            "patent_search" => Self::search(&arguments),
            "patent_detail" => Self::detail(&arguments),
            other => Err(Error::ToolExecution(format!("Unknown tool: {}", other))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_by_english_title() {
        let mut provider = MockPatentProvider::new();
        let output = provider
            .call_tool("patent_search", json!({"word": "ginseng"}))
            .await
            .unwrap();
        assert!(output.to_text().contains("10-2015-0041234"));
    }

    #[tokio::test]
    async fn test_search_no_match() {
        let mut provider = MockPatentProvider::new();
        let output = provider
            .call_tool("patent_search", json!({"word": "IGF-1 oral absorption"}))
            .await
            .unwrap();
        assert!(output.to_text().starts_with("No patents found"));
    }

    #[tokio::test]
    async fn test_search_requires_word() {
        let mut provider = MockPatentProvider::new();
        let result = provider.call_tool("patent_search", json!({})).await;
        assert!(matches!(result, Err(Error::ToolExecution(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let mut provider = MockPatentProvider::new();
        assert!(provider.call_tool("nope", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_detail_lookup() {
        let mut provider = MockPatentProvider::new();
        let output = provider
            .call_tool("patent_detail", json!({"application_number": "10-2021-0087654"}))
            .await
            .unwrap();
        assert!(output.to_text().contains("Medibridge"));
    }
}
