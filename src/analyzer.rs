//! Analyzer - one call per ad script
//!
//! Builds a fresh tool session for every run, drives the agent loop, then
//! annotates the answer with citations and writes the debug report and the
//! archived response. The tool session is closed whether the run succeeds
//! or fails.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::agent::{add_citations, AgentLoop, LlmClient, LoopOutcome, RunContext, Termination, Usage};
use crate::archive::ResponseArchive;
use crate::config::Config;
use crate::tools::ToolConnector;
use crate::Result;

type ConnectorFactory = Box<dyn Fn() -> ToolConnector + Send + Sync>;

/// What a caller gets back from one analysis
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Plain answer text
    pub answer: String,
    /// Answer with inline citation links
    pub annotated_answer: String,
    pub usage: Usage,
    pub termination: Termination,
    pub debug_report_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
}

/// Caller-facing entry point.
///
/// Holds only immutable settings, so concurrent runs on separate tasks share
/// nothing mutable.
pub struct Analyzer<C: LlmClient> {
    agent: AgentLoop<C>,
    config: Config,
    connectors: ConnectorFactory,
}

impl<C: LlmClient> Analyzer<C> {
    /// Use the configured patent server, or the mock provider when `use_mock`
    /// is set or no usable key is configured
    pub fn new(client: C, config: Config, use_mock: bool) -> Self {
        let server_config = config.clone();
        Self::with_connector_factory(client, config, move || {
            ToolConnector::from_config(&server_config, use_mock)
        })
    }

    /// Use `factory` to build the tool session for each run
    pub fn with_connector_factory(
        client: C,
        config: Config,
        factory: impl Fn() -> ToolConnector + Send + Sync + 'static,
    ) -> Self {
        let agent = AgentLoop::new(client, config.max_turns)
            .with_builtin_tools(config.builtin_tools.clone());
        Self {
            agent,
            config,
            connectors: Box::new(factory),
        }
    }

    /// Analyze one ad script with the given system prompt
    pub async fn run(&self, system_prompt: &str, payload: &str) -> Result<AnalysisReport> {
        let mut ctx = RunContext::new((self.connectors)(), self.config.google_search);
        info!(
            "Analyzing with model {} and tool provider {}",
            self.agent.client().model(),
            ctx.connector.provider_name()
        );

        let result = self.drive(system_prompt, payload, &mut ctx).await;
        ctx.close().await;

        let debug_report_path = match ctx.logger.save(&self.config.debug_dir) {
            Ok(path) => {
                info!("Debug report saved to {:?}", path);
                Some(path)
            }
            Err(e) => {
                warn!("Failed to save debug report: {}", e);
                None
            }
        };

        let outcome = result?;
        let annotated_answer = annotate(&outcome);

        let archive = ResponseArchive::new(&self.config.archive_dir);
        let archive_path = match archive.save(&outcome.usage, system_prompt, &annotated_answer) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to archive response: {}", e);
                None
            }
        };

        Ok(AnalysisReport {
            answer: outcome.answer,
            annotated_answer,
            usage: outcome.usage,
            termination: outcome.termination,
            debug_report_path,
            archive_path,
        })
    }

    async fn drive(
        &self,
        system_prompt: &str,
        payload: &str,
        ctx: &mut RunContext,
    ) -> Result<LoopOutcome> {
        ctx.prepare().await?;
        self.agent.run(system_prompt, payload, ctx).await
    }
}

/// Grounding offsets refer to the final response text, so only that text
/// can be annotated.
fn annotate(outcome: &LoopOutcome) -> String {
    match outcome.final_response.text.as_deref() {
        Some(text) if text == outcome.answer => {
            add_citations(text, outcome.final_response.grounding.as_ref())
        }
        _ => outcome.answer.clone(),
    }
}
