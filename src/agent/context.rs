//! Per-run state handed to the agent loop.

use tracing::debug;

use crate::tools::ToolConnector;
use crate::Result;

use super::llm::ToolSet;
use super::run_log::RunLogger;

/// Everything one analysis run owns besides the conversation itself.
///
/// Built fresh for every run; never shared between concurrent runs.
pub struct RunContext {
    pub connector: ToolConnector,
    pub logger: RunLogger,
    pub tools: ToolSet,
}

impl RunContext {
    pub fn new(connector: ToolConnector, google_search: bool) -> Self {
        Self {
            connector,
            logger: RunLogger::new(),
            tools: ToolSet {
                declarations: Vec::new(),
                google_search,
            },
        }
    }

    /// Connect to the tool provider and load its function declarations
    pub async fn prepare(&mut self) -> Result<()> {
        self.tools.declarations = self.connector.list_tools().await?;
        debug!(
            "Prepared {} function declarations (google_search: {})",
            self.tools.declarations.len(),
            self.tools.google_search
        );
        Ok(())
    }

    /// Release the tool provider session
    pub async fn close(&mut self) {
        self.connector.disconnect().await;
    }
}
