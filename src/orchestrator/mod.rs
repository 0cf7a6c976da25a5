//! Orchestrator Loop (`spec.md` §4.8): plan, execute one step at a time,
//! decide whether to replan, and finally compose a reply.

use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::agents::AgentRegistry;
use crate::composer::{clamp_for_channel, synthesize};
use crate::config::{Limits, Settings};
use crate::context::{Channel, ExecutionContext, StepResult};
use crate::conversation::{window_messages, ConversationMessage};
use crate::llm::LlmChatClient;
use crate::plan::{ExecutionPlan, PlanContext, PlanError};
use crate::planner::Planner;
use crate::replanner::{ReplanGuardLimits, Replanner};
use crate::skills::SkillRegistry;
use crate::stores::{ConversationStore, CredentialStore, MemoryStore, StoreError, UserConfigStore};
use crate::tools::ToolRegistry;

/// Outcome of [`OrchestratorCore::handle_request`]: whether every terminal
/// step in the final plan succeeded, plus the channel-clamped reply text
/// (`spec.md` §4.8 "return { success, response }").
#[derive(Debug, Clone)]
pub struct HandledRequest {
    pub success: bool,
    pub response: String,
    pub plan: ExecutionPlan,
}

/// Wires together every request-handling component behind one entry point
/// (`spec.md` §4.8, §6 "Core-defined entry points"). Constructed once per
/// process with its collaborators injected, per `spec.md` §9's note against
/// global mutable singletons.
pub struct OrchestratorCore<'a> {
    pub llm: &'a dyn LlmChatClient,
    pub tools: &'a ToolRegistry,
    pub agents: &'a AgentRegistry,
    pub skills: &'a SkillRegistry,
    pub conversations: &'a (dyn ConversationStore + 'a),
    pub user_configs: &'a (dyn UserConfigStore + 'a),
    pub credentials: &'a (dyn CredentialStore + 'a),
    pub memory: &'a (dyn MemoryStore + 'a),
    pub settings: Settings,
}

impl<'a> OrchestratorCore<'a> {
    /// `handle_request(user, channel, message, userConfig) → reply`
    /// (`spec.md` §6). Builds the execution context, plans, drives the
    /// execute/replan loop, and returns the composed reply.
    #[instrument(level = "info", skip(self, message), fields(user, channel = channel.as_str()))]
    pub async fn handle_request(&self, user: &str, channel: Channel, message: &str) -> Result<HandledRequest, StoreError> {
        let now = Utc::now();
        let started = Instant::now();

        let user_config = self.user_configs.get(user).await?;
        let profile = user_config.profile.clone();

        let history = self.conversations.get_history(user, self.settings.window.max_messages, None).await?;
        let window = window_messages(&history, now, self.settings.window.max_age_hours, self.settings.window.max_messages, self.settings.window.max_tokens);

        let facts = self.memory.get_facts(user).await?;
        let fact_pairs: Vec<(String, f64)> = facts.iter().map(|f| (f.fact.clone(), f.confidence)).collect();

        let mut ctx = ExecutionContext::new(user, channel, now);
        ctx.profile = Some(profile.clone());

        let mut plan_ctx = PlanContext {
            user_message: message.to_string(),
            history_window: window,
            user_facts: fact_pairs,
            phone: user.to_string(),
            channel,
            user_config,
            step_results: std::collections::HashMap::new(),
            errors: Vec::new(),
        };

        let agent_caps = self.agents.capabilities();
        let skill_list: Vec<_> = self.skills.routable_from(channel);

        let planner = Planner::new(self.llm, self.settings.limits.max_total_steps);
        let mut plan = planner.create(&plan_ctx, &agent_caps, &skill_list, None, now).await;

        self.store_inbound(user, channel, message, now).await?;

        let replanner = Replanner::new(
            self.llm,
            ReplanGuardLimits {
                max_replans: self.settings.limits.max_replans as u32,
                max_total_steps: self.settings.limits.max_total_steps,
                max_execution_time_ms: self.settings.limits.max_execution_time_ms,
            },
        );

        self.run_loop(&mut plan, &mut ctx, &mut plan_ctx, &agent_caps, &replanner, &self.settings.limits, started)
            .await;

        let reply = clamp_for_channel(&synthesize(&plan), channel);
        self.store_outbound(user, channel, &reply, Utc::now()).await?;

        Ok(HandledRequest {
            success: plan.all_succeeded(),
            response: reply,
            plan,
        })
    }

    /// The core execute/decide/replan cycle (`spec.md` §4.8). Mutates `plan`
    /// and `ctx` in place; returns once every step is terminal, a guard is
    /// exhausted, or the wall-clock/iteration safety caps trip.
    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        &self,
        plan: &mut ExecutionPlan,
        ctx: &mut ExecutionContext,
        plan_ctx: &mut PlanContext,
        agent_caps: &[&crate::agents::AgentCapability],
        replanner: &Replanner<'_>,
        limits: &Limits,
        started: Instant,
    ) {
        let executor = crate::executor::StepExecutor {
            agents: self.agents,
            skills: self.skills,
            llm: self.llm,
            tools: self.tools,
            max_tool_iterations: limits.max_tool_iterations,
        };

        // A safety cap independent of the replan guard: bounds total
        // iterations even if a step neither completes nor requests replan.
        let safety_cap = limits.max_total_steps * (limits.max_replans + 1) + limits.max_total_steps;

        for _ in 0..safety_cap {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms > limits.max_execution_time_ms {
                warn!(plan_id = %plan.id, "orchestrator loop stopped: wall-clock budget exceeded");
                break;
            }

            let Some(step_idx) = plan.first_pending_index() else {
                break;
            };
            let remaining_after = plan.steps.len() - step_idx - 1;

            {
                let step = &mut plan.steps[step_idx];
                executor.execute(step, ctx).await;
                if let Some(result) = step.result.clone() {
                    ctx.step_results.insert(step.id.clone(), result.clone());
                    plan_ctx.step_results.insert(step.id.clone(), result);
                }
            }

            let step = &plan.steps[step_idx];
            let result = step.result.as_ref().expect("executor always sets a result");
            if let StepResult::Failure { error, .. } = result {
                plan_ctx.errors.push(PlanError {
                    step_id: step.id.clone(),
                    error: error.clone(),
                });
            }

            if should_replan(result, remaining_after) {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if replanner.can_replan(plan, elapsed_ms) {
                    info!(plan_id = %plan.id, version = plan.version, "replanning");
                    *plan = replanner.replan(plan, agent_caps, plan_ctx, Utc::now()).await;
                    plan_ctx.errors.clear();
                    continue;
                }
                warn!(plan_id = %plan.id, "replan indicated but guard refused, treating as terminal");
                break;
            }
        }

        plan.status = if plan.all_terminal() && plan.all_succeeded() {
            crate::plan::PlanStatus::Completed
        } else {
            crate::plan::PlanStatus::Failed
        };
        plan.updated_at = Utc::now();
    }

    async fn store_inbound(&self, user: &str, channel: Channel, message: &str, now: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        self.conversations
            .add_message(
                user,
                ConversationMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    role: crate::conversation::ConversationRole::User,
                    content: message.to_string(),
                    created_at: now,
                    channel,
                },
            )
            .await
    }

    async fn store_outbound(&self, user: &str, channel: Channel, reply: &str, now: chrono::DateTime<Utc>) -> Result<(), StoreError> {
        self.conversations
            .add_message(
                user,
                ConversationMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    role: crate::conversation::ConversationRole::Assistant,
                    content: reply.to_string(),
                    created_at: now,
                    channel,
                },
            )
            .await
    }
}

/// `shouldReplan(result, remainingSteps)`, conditions evaluated in the exact
/// order required by `SPEC_FULL.md` §4.8: an explicit replan request always
/// wins; a failure on a non-final step triggers replan (failure on the last
/// step is definitive, not worth a replan); an empty result on a non-final
/// step also triggers replan.
fn should_replan(result: &StepResult, remaining_steps: usize) -> bool {
    if result.needs_replan() {
        return true;
    }
    if !result.is_success() && remaining_steps > 0 {
        return true;
    }
    if result.is_empty_result() && remaining_steps > 0 {
        return true;
    }
    false
}
