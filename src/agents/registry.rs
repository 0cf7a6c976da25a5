use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::context::{ExecutionContext, StepResult};
use crate::llm::LlmChatClient;
use crate::tools::ToolRegistry;

use super::GENERAL_AGENT;

/// Capability descriptor surfaced to the planner's prompt (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    /// `["*"]` means "every registered tool".
    pub tools: Vec<String>,
    pub examples: Vec<String>,
}

/// Signature for a registered agent executor: `(task, ctx, llm, tool
/// registry, max_tool_iterations) -> StepResult`. Mirrors the shape of
/// [`crate::tools::AsyncToolFn`] one layer up the stack.
pub type AgentExecutorFn = Arc<
    dyn for<'a> Fn(
            &'a str,
            &'a ExecutionContext,
            &'a dyn LlmChatClient,
            &'a ToolRegistry,
            usize,
        ) -> Pin<Box<dyn Future<Output = StepResult> + Send + 'a>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct AgentEntry {
    pub capability: AgentCapability,
    pub executor: AgentExecutorFn,
}

/// Static mapping from agent name to (capability, executor), built once at
/// startup (`spec.md` §4.2).
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: AgentEntry) {
        self.agents.insert(entry.capability.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&AgentEntry> {
        self.agents.get(name)
    }

    pub fn capabilities(&self) -> Vec<&AgentCapability> {
        self.agents.values().map(|e| &e.capability).collect()
    }

    /// `routeToAgent(name, task, ctx)`: an unknown name falls back to
    /// `general-agent`; if that is also unregistered, returns a typed
    /// failure rather than crashing (`spec.md` §4.2).
    #[instrument(level = "debug", skip(self, ctx, llm, tools))]
    pub async fn route_to_agent(
        &self,
        name: &str,
        task: &str,
        ctx: &ExecutionContext,
        llm: &dyn LlmChatClient,
        tools: &ToolRegistry,
        max_tool_iterations: usize,
    ) -> StepResult {
        if let Some(entry) = self.agents.get(name) {
            return (entry.executor)(task, ctx, llm, tools, max_tool_iterations).await;
        }

        warn!(agent = name, "unknown agent requested, falling back to general-agent");
        if let Some(fallback) = self.agents.get(GENERAL_AGENT) {
            return (fallback.executor)(task, ctx, llm, tools, max_tool_iterations).await;
        }

        StepResult::failure("unknown agent")
    }
}
