//! Step Executor (`spec.md` §4.6): runs a single plan step, resolving its
//! target, normalizing the result, and enforcing retries.

use tracing::{instrument, warn};

use crate::agents::AgentRegistry;
use crate::context::{ExecutionContext, StepResult};
use crate::llm::LlmChatClient;
use crate::plan::{PlanStep, StepStatus, TargetType};
use crate::skills::SkillRegistry;
use crate::tools::ToolRegistry;

/// Error substrings that mark a failure as transient, per `SPEC_FULL.md`
/// §4.6's resolution of the retry-classifier Open Question: an explicit
/// `retryable` flag on the callee's [`StepResult::Failure`] OR one of these
/// substrings (case-insensitive).
const TRANSIENT_SUBSTRINGS: &[&str] = &["timeout", "connection reset", "temporarily unavailable", "429", "503"];

pub struct StepExecutor<'a> {
    pub agents: &'a AgentRegistry,
    pub skills: &'a SkillRegistry,
    pub llm: &'a dyn LlmChatClient,
    pub tools: &'a ToolRegistry,
    pub max_tool_iterations: usize,
}

impl<'a> StepExecutor<'a> {
    /// `executeStep(step, planContext, agentRegistry, logger) → StepResult`
    /// (`spec.md` §4.6), mutating `step` in place.
    #[instrument(level = "debug", skip(self, step, ctx), fields(step_id = %step.id, target = %step.target))]
    pub async fn execute(&self, step: &mut PlanStep, ctx: &ExecutionContext) {
        step.status = StepStatus::Running;

        loop {
            let result = self.invoke_target(step, ctx).await;

            if let StepResult::Failure { .. } = &result {
                if self.is_transient(&result) && step.retry_count < step.max_retries {
                    step.retry_count += 1;
                    warn!(step_id = %step.id, retry_count = step.retry_count, "retrying transient step failure");
                    continue;
                }
            }

            step.status = if result.is_success() { StepStatus::Completed } else { StepStatus::Failed };
            step.result = Some(result);
            return;
        }
    }

    async fn invoke_target(&self, step: &PlanStep, ctx: &ExecutionContext) -> StepResult {
        match step.target_type {
            TargetType::Agent => {
                if self.agents.get(&step.target).is_none() && self.agents.get(crate::agents::GENERAL_AGENT).is_none() {
                    return StepResult::failure("unknown agent");
                }
                self.agents
                    .route_to_agent(&step.target, &step.task, ctx, self.llm, self.tools, self.max_tool_iterations)
                    .await
            }
            TargetType::Skill => {
                let result = self
                    .skills
                    .execute_by_name(&step.target, &step.task, ctx, self.llm, self.tools, self.agents, self.max_tool_iterations)
                    .await;
                if result.success {
                    StepResult::success(result.output.map(serde_json::Value::String))
                } else {
                    StepResult::failure(result.error.unwrap_or_else(|| "skill execution failed".to_string()))
                }
            }
        }
    }

    fn is_transient(&self, result: &StepResult) -> bool {
        match result {
            StepResult::Failure { error, retryable, .. } => {
                *retryable || TRANSIENT_SUBSTRINGS.iter().any(|s| error.to_lowercase().contains(s))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agents::{AgentCapability, AgentEntry};
    use crate::context::Channel;
    use crate::llm::test_double::ScriptedLlmClient;
    use crate::plan::PlanStep;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("u1", Channel::Sms, chrono::Utc::now())
    }

    fn agent_registry_with(name: &str, result: StepResult) -> AgentRegistry {
        let mut reg = AgentRegistry::new();
        let result = std::sync::Mutex::new(Some(result));
        reg.register(AgentEntry {
            capability: AgentCapability {
                name: name.to_string(),
                description: "d".into(),
                tools: vec!["*".into()],
                examples: vec![],
            },
            executor: Arc::new(move |_task, _ctx, _llm, _tools, _max| {
                let result = result.lock().unwrap().take().unwrap_or_else(|| StepResult::failure("exhausted"));
                Box::pin(async move { result })
            }),
        });
        reg
    }

    #[tokio::test]
    async fn successful_step_marked_completed() {
        let agents = agent_registry_with("general-agent", StepResult::success(None));
        let skills = SkillRegistry::default();
        let llm = ScriptedLlmClient::text_once("unused");
        let tools = ToolRegistry::new();
        let executor = StepExecutor {
            agents: &agents,
            skills: &skills,
            llm: &llm,
            tools: &tools,
            max_tool_iterations: 10,
        };
        let mut step = PlanStep::new("step_1", TargetType::Agent, "general-agent", "say hi");
        executor.execute(&mut step, &ctx()).await;
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_agent_without_fallback_fails_without_retry() {
        let agents = AgentRegistry::new();
        let skills = SkillRegistry::default();
        let llm = ScriptedLlmClient::text_once("unused");
        let tools = ToolRegistry::new();
        let executor = StepExecutor {
            agents: &agents,
            skills: &skills,
            llm: &llm,
            tools: &tools,
            max_tool_iterations: 10,
        };
        let mut step = PlanStep::new("step_1", TargetType::Agent, "nope", "do it");
        executor.execute(&mut step, &ctx()).await;
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.retry_count, 0);
    }

    #[tokio::test]
    async fn transient_failure_retries_in_place_before_surfacing() {
        let mut reg = AgentRegistry::new();
        let call_count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = call_count.clone();
        reg.register(AgentEntry {
            capability: AgentCapability {
                name: "flaky-agent".into(),
                description: "d".into(),
                tools: vec!["*".into()],
                examples: vec![],
            },
            executor: Arc::new(move |_task, _ctx, _llm, _tools, _max| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    StepResult::Failure {
                        error: "upstream timeout".into(),
                        retryable: false,
                        tool_calls: vec![],
                        token_usage: None,
                    }
                })
            }),
        });
        let skills = SkillRegistry::default();
        let llm = ScriptedLlmClient::text_once("unused");
        let tools = ToolRegistry::new();
        let executor = StepExecutor {
            agents: &reg,
            skills: &skills,
            llm: &llm,
            tools: &tools,
            max_tool_iterations: 10,
        };
        let mut step = PlanStep::new("step_1", TargetType::Agent, "flaky-agent", "do it");
        executor.execute(&mut step, &ctx()).await;
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.retry_count, 2);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
