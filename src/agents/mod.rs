//! Agent Registry & Router (`spec.md` §4.2).
//!
//! An agent is a named bundle of a capability descriptor (used by the
//! planner's prompt) and an executor closure that builds a system prompt and
//! drives the [`crate::tools::ToolExecutionSurface`] with its tool allow-list.

mod registry;
mod template;

pub use registry::{AgentCapability, AgentEntry, AgentExecutorFn, AgentRegistry};
pub use template::template_agent_executor;

pub const GENERAL_AGENT: &str = "general-agent";
