//! Agent loop - multi-turn model/tool orchestration

use tracing::{debug, info, warn};
use crate::Result;
use crate::templates;
use super::context::RunContext;
use super::llm::{LlmClient, LlmResponse, Usage};
use super::message::{ConversationState, ToolResultEntry, Turn};
use super::run_log::LogRole;

/// Answer used when the model never produced any text
pub const NO_RESULT_TEXT: &str = "No analysis result was produced.";

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools
    Completed,
    /// Every request in the last turn was a built-in tool
    BuiltinOnly,
    /// The tool-cycle budget ran out while tools were still requested
    BudgetExhausted,
}

/// Result of one loop run
#[derive(Debug)]
pub struct LoopOutcome {
    /// Best available answer text
    pub answer: String,
    /// The last model response, carrying grounding metadata if any
    pub final_response: LlmResponse,
    /// Usage summed over every model call
    pub usage: Usage,
    pub model_calls: usize,
    pub tool_cycles: usize,
    pub termination: Termination,
    pub conversation: ConversationState,
}

/// The agent loop drives the model through tool-calling turns
pub struct AgentLoop<C: LlmClient> {
    client: C,
    max_turns: usize,
    builtin_tools: Vec<String>,
}

impl<C: LlmClient> AgentLoop<C> {
    /// Create a new agent loop
    pub fn new(client: C, max_turns: usize) -> Self {
        Self {
            client,
            max_turns,
            builtin_tools: Vec::new(),
        }
    }

    /// Tool names the model handles itself; these are never forwarded
    pub fn with_builtin_tools(mut self, names: Vec<String>) -> Self {
        self.builtin_tools = names;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.builtin_tools.iter().any(|b| b == name)
    }

    /// Run the loop for one system prompt and payload
    pub async fn run(
        &self,
        system_prompt: &str,
        payload: &str,
        ctx: &mut RunContext,
    ) -> Result<LoopOutcome> {
        let prompt = templates::compose_prompt(system_prompt, payload);
        let mut conversation = ConversationState::seeded(prompt.as_str());
        ctx.logger.log_call(LogRole::User, Some(&prompt), &[]);

        info!("Starting agent loop: {} chars of payload", payload.len());

        let mut response = self.client.generate(conversation.turns(), &ctx.tools).await?;
        let mut usage = response.usage;
        let mut model_calls = 1;
        let mut last_text = response.text.clone();
        ctx.logger.log_call(LogRole::Model, response.text.as_deref(), &response.tool_requests);

        let mut tool_cycles = 0;

        let termination = loop {
            if !response.has_tool_calls() {
                break Termination::Completed;
            }

            if tool_cycles >= self.max_turns {
                warn!("Reached max tool cycles ({}), stopping", self.max_turns);
                ctx.logger.note(format!(
                    "Tool-cycle budget of {} exhausted; returning the last available response",
                    self.max_turns
                ));
                break Termination::BudgetExhausted;
            }

            tool_cycles += 1;
            debug!("Tool cycle {}/{}", tool_cycles, self.max_turns);

            conversation.push(Turn::model(
                response.text.clone(),
                response.tool_requests.clone(),
            ))?;

            let mut results = Vec::with_capacity(response.tool_requests.len());
            for request in &response.tool_requests {
                if self.is_builtin(&request.name) {
                    debug!("Skipping built-in tool: {}", request.name);
                    continue;
                }

                info!("Calling tool {} with args: {}", request.name, request.arguments);
                let output = ctx
                    .connector
                    .call_tool(&request.name, request.arguments.clone())
                    .await;
                let text = output.to_text();
                ctx.logger.log_tool_result(&request.name, &text);

                results.push(if output.is_error {
                    ToolResultEntry::failure(&request.name, text)
                } else {
                    ToolResultEntry::success(&request.name, text)
                });
            }

            if results.is_empty() {
                debug!("Only built-in tools requested, ending loop");
                break Termination::BuiltinOnly;
            }

            conversation.push(Turn::tool_results(results))?;

            response = self.client.generate(conversation.turns(), &ctx.tools).await?;
            model_calls += 1;
            usage.accumulate(&response.usage);
            if response.text.is_some() {
                last_text = response.text.clone();
            }
            ctx.logger.log_call(LogRole::Model, response.text.as_deref(), &response.tool_requests);
        };

        if termination != Termination::BuiltinOnly {
            conversation.push(Turn::model(
                response.text.clone(),
                response.tool_requests.clone(),
            ))?;
        }

        let answer = response
            .text
            .clone()
            .or(last_text)
            .unwrap_or_else(|| NO_RESULT_TEXT.to_string());

        ctx.logger.set_usage(usage);
        info!(
            "Agent loop finished ({:?}) after {} model calls: {} chars",
            termination,
            model_calls,
            answer.len()
        );

        Ok(LoopOutcome {
            answer,
            final_response: response,
            usage,
            model_calls,
            tool_cycles,
            termination,
            conversation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::message::ToolRequest;
    use crate::error::Error;
    use crate::tools::{FakeToolProvider, ToolConnector};
    use serde_json::json;

    fn ctx_with(results: &[(&str, &str)]) -> (RunContext, std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
        let provider = FakeToolProvider::new(results);
        let calls = provider.calls.clone();
        (RunContext::new(ToolConnector::new(provider), false), calls)
    }

    fn builtins() -> Vec<String> {
        vec!["web_search".to_string(), "google_search".to_string()]
    }

    fn request(name: &str) -> ToolRequest {
        ToolRequest::new(name, json!({"word": "IGF-1"}))
    }

    fn model_turns(conversation: &ConversationState) -> usize {
        conversation
            .turns()
            .iter()
            .filter(|t| matches!(t, Turn::Model { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_agent_loop_simple() {
        let client = FakeLlmClient::new(vec!["Rating: safe"]);
        let (mut ctx, _) = ctx_with(&[]);
        let agent = AgentLoop::new(client, 10);

        let outcome = agent.run("Analyze", "ad text", &mut ctx).await.unwrap();

        assert_eq!(outcome.answer, "Rating: safe");
        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.tool_cycles, 0);

        let seen = agent.client().seen();
        assert_eq!(seen[0], vec![Turn::user(templates::compose_prompt("Analyze", "ad text"))]);
    }

    #[tokio::test]
    async fn test_builtin_tool_skipped_alongside_real_tool() {
        let client = FakeLlmClient::scripted(vec![
            LlmResponse::tool_calls(vec![request("patent_search"), request("web_search")]),
            LlmResponse::text("Rating: danger"),
        ]);
        let (mut ctx, calls) = ctx_with(&[("patent_search", "No patents found")]);
        let agent = AgentLoop::new(client, 10).with_builtin_tools(builtins());

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();

        assert_eq!(outcome.answer, "Rating: danger");
        assert_eq!(*calls.lock().unwrap(), vec!["patent_search".to_string()]);

        let second_call = &agent.client().seen()[1];
        match second_call.last().unwrap() {
            Turn::ToolResults { results } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].name, "patent_search");
                assert_eq!(results[0].content, "No patents found");
            }
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_builtin_tools_ends_loop() {
        let mut response = LlmResponse::tool_calls(vec![request("google_search")]);
        response.text = Some("Partial answer".to_string());
        let client = FakeLlmClient::scripted(vec![response, LlmResponse::text("never sent")]);
        let (mut ctx, calls) = ctx_with(&[]);
        let agent = AgentLoop::new(client, 10).with_builtin_tools(builtins());

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();

        assert_eq!(outcome.termination, Termination::BuiltinOnly);
        assert_eq!(outcome.answer, "Partial answer");
        assert_eq!(outcome.model_calls, 1);
        assert!(calls.lock().unwrap().is_empty());
        assert!(!outcome
            .conversation
            .turns()
            .iter()
            .any(|t| matches!(t, Turn::ToolResults { .. })));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_text() {
        let turn = |text: &str| {
            let mut r = LlmResponse::tool_calls(vec![request("patent_search")]);
            r.text = Some(text.to_string());
            r
        };
        let client = FakeLlmClient::scripted(vec![turn("t1"), turn("t2"), turn("t3"), turn("t4")]);
        let (mut ctx, calls) = ctx_with(&[("patent_search", "result")]);
        let agent = AgentLoop::new(client, 2);

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();

        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(outcome.tool_cycles, 2);
        assert_eq!(outcome.model_calls, 3);
        assert_eq!(outcome.answer, "t3");
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert!(ctx.logger.generate_report().contains("budget of 2 exhausted"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_without_text_uses_earlier_text() {
        let mut first = LlmResponse::tool_calls(vec![request("patent_search")]);
        first.text = Some("draft".to_string());
        let client = FakeLlmClient::scripted(vec![
            first,
            LlmResponse::tool_calls(vec![request("patent_search")]),
        ]);
        let (mut ctx, _) = ctx_with(&[("patent_search", "result")]);
        let agent = AgentLoop::new(client, 1);

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();
        assert_eq!(outcome.answer, "draft");
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back_and_run_continues() {
        let client = FakeLlmClient::scripted(vec![
            LlmResponse::tool_calls(vec![request("patent_search")]),
            LlmResponse::text("Patent could not be verified"),
        ]);
        // No scripted result: the fake provider fails the call
        let (mut ctx, _) = ctx_with(&[]);
        let agent = AgentLoop::new(client, 10);

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();

        assert_eq!(outcome.answer, "Patent could not be verified");
        assert_eq!(outcome.model_calls, 2);

        let results = outcome
            .conversation
            .turns()
            .iter()
            .find_map(|t| match t {
                Turn::ToolResults { results } => Some(results.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].content.contains("exploded"));
    }

    #[tokio::test]
    async fn test_usage_accumulates_and_matches_logged_calls() {
        let client = FakeLlmClient::scripted(vec![
            LlmResponse::tool_calls(vec![request("patent_search")]).with_usage(Usage::new(10, 5)),
            LlmResponse::tool_calls(vec![request("patent_search")]).with_usage(Usage::new(20, 7)),
            LlmResponse::text("done").with_usage(Usage::new(30, 1)),
        ]);
        let (mut ctx, _) = ctx_with(&[("patent_search", "ok")]);
        let agent = AgentLoop::new(client, 10);

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();

        assert_eq!(outcome.usage, Usage::new(60, 13));
        assert_eq!(outcome.usage.total_tokens, 73);
        assert_eq!(ctx.logger.model_calls(), outcome.model_calls);
        assert_eq!(model_turns(&outcome.conversation), outcome.model_calls);
        assert_eq!(ctx.logger.tool_calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_is_fatal() {
        let client = FakeLlmClient::with_results(vec![
            Ok(LlmResponse::tool_calls(vec![request("patent_search")])),
            Err(Error::Provider("503 Service Unavailable".to_string())),
        ]);
        let (mut ctx, _) = ctx_with(&[("patent_search", "ok")]);
        let agent = AgentLoop::new(client, 10);

        let result = agent.run("Analyze", "ad", &mut ctx).await;

        assert!(matches!(result, Err(Error::Provider(_))));
        // Steps logged before the failure are kept for the report
        assert_eq!(ctx.logger.model_calls(), 1);
        assert_eq!(ctx.logger.tool_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_text_anywhere_uses_fallback() {
        let client = FakeLlmClient::scripted(vec![LlmResponse::default()]);
        let (mut ctx, _) = ctx_with(&[]);
        let agent = AgentLoop::new(client, 10);

        let outcome = agent.run("Analyze", "ad", &mut ctx).await.unwrap();
        assert_eq!(outcome.answer, NO_RESULT_TEXT);
    }
}
