//! Gemini LLM client implementation (API key authentication).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::citations::{Grounding, GroundingChunk, GroundingSpan};
use crate::agent::message::{ToolRequest, Turn};
use crate::error::Error;
use crate::Result;

use super::{GeminiResponse, GroundingMetadata, LlmClient, LlmResponse, ToolSet, Usage};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client using API key authentication.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Create a client whose requests fail after `timeout`.
    pub fn with_timeout(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn build_url(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_URL, self.model)
    }

    fn convert_turns(turns: &[Turn]) -> Vec<Value> {
        turns
            .iter()
            .map(|turn| match turn {
                Turn::User { text } => json!({
                    "role": "user",
                    "parts": [{"text": text}]
                }),
                Turn::Model { text, requests } => {
                    let mut parts = Vec::with_capacity(requests.len() + 1);
                    if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                        parts.push(json!({"text": text}));
                    }
                    for request in requests {
                        let mut part = json!({
                            "functionCall": {
                                "name": request.name,
                                "args": request.arguments
                            }
                        });
                        if let Some(ref signature) = request.thought_signature {
                            part["thoughtSignature"] = json!(signature);
                        }
                        parts.push(part);
                    }
                    json!({
                        "role": "model",
                        "parts": parts
                    })
                }
                Turn::ToolResults { results } => {
                    let parts: Vec<Value> = results
                        .iter()
                        .map(|r| {
                            let response = if r.is_error {
                                json!({"error": r.content})
                            } else {
                                json!({"result": r.content})
                            };
                            json!({
                                "functionResponse": {
                                    "name": r.name,
                                    "response": response
                                }
                            })
                        })
                        .collect();
                    json!({
                        "role": "user",
                        "parts": parts
                    })
                }
            })
            .collect()
    }

    fn convert_tools(tools: &ToolSet) -> Option<Value> {
        let mut entries = Vec::new();

        if !tools.declarations.is_empty() {
            let function_declarations: Vec<Value> = tools
                .declarations
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    })
                })
                .collect();
            entries.push(json!({ "functionDeclarations": function_declarations }));
        }

        if tools.google_search {
            entries.push(json!({ "googleSearch": {} }));
        }

        if entries.is_empty() {
            None
        } else {
            Some(Value::Array(entries))
        }
    }

    fn build_request(turns: &[Turn], tools: &ToolSet) -> Value {
        let mut request = json!({
            "contents": Self::convert_turns(turns),
        });

        if let Some(tool_config) = Self::convert_tools(tools) {
            request["tools"] = tool_config;
        }

        request
    }

    fn parse_response(response: GeminiResponse) -> Result<LlmResponse> {
        let usage = response
            .usage_metadata
            .as_ref()
            .map(|u| {
                let completion = u.candidates_token_count.unwrap_or(0)
                    + u.thoughts_token_count.unwrap_or(0);
                let usage = Usage::new(u.prompt_token_count.unwrap_or(0), completion);
                if let Some(reported) = u.total_token_count {
                    if reported != usage.total_tokens {
                        debug!(
                            "Reported total {} differs from prompt+completion {}",
                            reported, usage.total_tokens
                        );
                    }
                }
                usage
            })
            .unwrap_or_default();

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(Error::Provider(format!("No candidates in response ({reason})")));
        };

        let mut text = String::new();
        let mut tool_requests = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(fc) = part.function_call {
                tool_requests.push(ToolRequest {
                    name: fc.name,
                    arguments: fc.args,
                    thought_signature: part.thought_signature,
                });
            } else if let Some(t) = part.text {
                if !part.thought {
                    text.push_str(&t);
                }
            }
        }

        Ok(LlmResponse {
            text: if text.is_empty() { None } else { Some(text) },
            tool_requests,
            finish_reason: candidate
                .finish_reason
                .unwrap_or_else(|| "STOP".to_string()),
            usage,
            grounding: candidate.grounding_metadata.and_then(convert_grounding),
        })
    }
}

/// Normalize Gemini grounding metadata; `None` when there is nothing to cite
fn convert_grounding(metadata: GroundingMetadata) -> Option<Grounding> {
    if metadata.grounding_supports.is_empty() {
        return None;
    }

    let chunks = metadata
        .grounding_chunks
        .into_iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            chunk
                .web
                .and_then(|w| w.uri)
                .map(|uri| GroundingChunk { index, uri })
        })
        .collect();

    let spans = metadata
        .grounding_supports
        .into_iter()
        .filter_map(|support| {
            support.segment.map(|segment| GroundingSpan {
                end_offset: segment.end_index,
                chunk_indices: support.grounding_chunk_indices,
            })
        })
        .collect();

    Some(Grounding { spans, chunks })
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, turns: &[Turn], tools: &ToolSet) -> Result<LlmResponse> {
        let request = Self::build_request(turns, tools);

        let response = self
            .client
            .post(self.build_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Gemini API error ({status}): {error_text}"
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Invalid Gemini response: {e}")))?;
        Self::parse_response(gemini_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ToolResultEntry;
    use crate::tools::ToolDefinition;

    fn parse(value: Value) -> Result<LlmResponse> {
        GeminiClient::parse_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_parse_function_calls_and_usage() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Checking the patent."},
                    {"functionCall": {"name": "patent_search", "args": {"word": "IGF-1"}},
                     "thoughtSignature": "sig-1"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 100,
                "candidatesTokenCount": 20,
                "thoughtsTokenCount": 5,
                "totalTokenCount": 125
            }
        }))
        .unwrap();

        assert_eq!(response.text.as_deref(), Some("Checking the patent."));
        assert_eq!(response.tool_requests.len(), 1);
        assert_eq!(response.tool_requests[0].name, "patent_search");
        assert_eq!(response.tool_requests[0].arguments["word"], "IGF-1");
        assert_eq!(response.tool_requests[0].thought_signature.as_deref(), Some("sig-1"));
        assert_eq!(response.usage, Usage::new(100, 25));
    }

    #[test]
    fn test_parse_grounding() {
        let response = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Claim one. Claim two."}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://a.example", "title": "A"}},
                        {"web": {"uri": "https://b.example", "title": "B"}}
                    ],
                    "groundingSupports": [
                        {"segment": {"startIndex": 0, "endIndex": 10}, "groundingChunkIndices": [0]},
                        {"segment": {"endIndex": 21}, "groundingChunkIndices": [0, 1]}
                    ]
                }
            }]
        }))
        .unwrap();

        let grounding = response.grounding.unwrap();
        assert_eq!(grounding.chunks.len(), 2);
        assert_eq!(grounding.spans[1].end_offset, 21);
        assert_eq!(grounding.spans[1].chunk_indices, vec![0, 1]);
    }

    #[test]
    fn test_parse_skips_thought_text() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [
                {"text": "internal reasoning", "thought": true},
                {"text": "Answer"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(response.text.as_deref(), Some("Answer"));
        assert_eq!(response.usage, Usage::default());
    }

    #[test]
    fn test_parse_blocked_prompt_is_provider_error() {
        let result = parse(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        }));
        match result {
            Err(Error::Provider(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_request_shapes_turns() {
        let turns = vec![
            Turn::user("prompt"),
            Turn::model(None, vec![ToolRequest::new("patent_search", json!({"q": "x"}))]),
            Turn::tool_results(vec![ToolResultEntry::failure("patent_search", "Error: down")]),
        ];
        let tools = ToolSet {
            declarations: vec![ToolDefinition {
                name: "patent_search".to_string(),
                description: "Search patents".to_string(),
                parameters: json!({"type": "object"}),
            }],
            google_search: true,
        };

        let request = GeminiClient::build_request(&turns, &tools);

        assert_eq!(request["contents"][1]["role"], "model");
        assert_eq!(request["contents"][1]["parts"][0]["functionCall"]["name"], "patent_search");
        assert_eq!(
            request["contents"][2]["parts"][0]["functionResponse"]["response"]["error"],
            "Error: down"
        );
        assert_eq!(request["tools"][0]["functionDeclarations"][0]["name"], "patent_search");
        assert!(request["tools"][1].get("googleSearch").is_some());
    }

    #[test]
    fn test_no_tools_omits_tools_key() {
        let request = GeminiClient::build_request(&[Turn::user("hi")], &ToolSet::default());
        assert!(request.get("tools").is_none());
    }
}
