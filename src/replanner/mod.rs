//! Replanner (`spec.md` §4.7): given a plan with failures/empties, produces
//! a revised plan that preserves completed steps.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::agents::AgentCapability;
use crate::llm::LlmChatClient;
use crate::plan::{ExecutionPlan, PlanContext, PlanError, PlanStep, StepStatus};
use crate::planner::parse_plan_json;

pub struct ReplanGuardLimits {
    pub max_replans: u32,
    pub max_total_steps: usize,
    pub max_execution_time_ms: u64,
}

pub struct Replanner<'a> {
    llm: &'a dyn LlmChatClient,
    limits: ReplanGuardLimits,
}

impl<'a> Replanner<'a> {
    pub fn new(llm: &'a dyn LlmChatClient, limits: ReplanGuardLimits) -> Self {
        Self { llm, limits }
    }

    /// Refuses if the version cap, the step-count cap, or the wall-clock cap
    /// has already been reached (`spec.md` §4.7 "Guards").
    pub fn can_replan(&self, plan: &ExecutionPlan, elapsed_ms: u64) -> bool {
        plan.version < self.limits.max_replans + 1
            && plan.steps.len() < self.limits.max_total_steps
            && elapsed_ms < self.limits.max_execution_time_ms
    }

    /// `replan(priorPlan, ctx, agentRegistry) → ExecutionPlan'`. The caller
    /// must have already checked [`Replanner::can_replan`]; a refusal here
    /// is treated as terminal failure by the orchestrator.
    #[instrument(level = "debug", skip(self, prior, agents, ctx), fields(plan_id = %prior.id, version = prior.version))]
    pub async fn replan(&self, prior: &ExecutionPlan, agents: &[&AgentCapability], ctx: &PlanContext, now: DateTime<Utc>) -> ExecutionPlan {
        let remaining_budget = self.limits.max_total_steps.saturating_sub(
            prior.steps.iter().filter(|s| s.status == StepStatus::Completed).count(),
        );
        let prompt = build_replan_prompt(prior, agents, &ctx.errors, remaining_budget);

        let proposed_raw = match self.llm.chat(&prompt, &[crate::llm::Message::user("Produce the revised plan.")], None, None).await {
            Ok(completion) => completion.text().and_then(|t| parse_plan_json(&t)),
            Err(_) => None,
        };

        self.merge(prior, proposed_raw, now)
    }

    fn merge(&self, prior: &ExecutionPlan, proposed: Option<crate::planner::RawPlan>, now: DateTime<Utc>) -> ExecutionPlan {
        // Step 1: every completed step from the prior plan, verbatim.
        let mut steps: Vec<PlanStep> = prior.steps.iter().filter(|s| s.status == StepStatus::Completed).cloned().collect();
        let existing_pairs: HashSet<(String, String)> = steps.iter().map(|s| (s.target.clone(), s.task.clone())).collect();

        // Step 2: append LLM-proposed steps not already present, honoring
        // their ids when unique.
        if let Some(raw_plan) = proposed {
            let mut seen_ids: HashSet<String> = steps.iter().map(|s| s.id.clone()).collect();
            let mut next_index = steps.len() + 1;
            for raw_step in raw_plan.steps {
                if steps.len() >= self.limits.max_total_steps {
                    break;
                }
                let Some(target_type) = crate::planner::parse_target_type(&raw_step.target_type) else {
                    continue;
                };
                let pair = (raw_step.target.clone(), raw_step.task.clone());
                if existing_pairs.contains(&pair) {
                    continue;
                }
                let id = if !raw_step.id.is_empty() && seen_ids.insert(raw_step.id.clone()) {
                    raw_step.id
                } else {
                    let id = format!("step_{next_index}_v{}", prior.version + 1);
                    next_index += 1;
                    id
                };
                steps.push(PlanStep::new(id, target_type, raw_step.target, raw_step.task));
            }
        }
        // Step 3: truncate (redundant with the per-push check above, kept for clarity).
        steps.truncate(self.limits.max_total_steps);

        ExecutionPlan {
            id: prior.id.clone(),
            user_request: prior.user_request.clone(),
            goal: prior.goal.clone(),
            steps,
            status: crate::plan::PlanStatus::Executing,
            version: prior.version + 1,
            created_at: prior.created_at,
            updated_at: now,
        }
    }
}

fn build_replan_prompt(prior: &ExecutionPlan, agents: &[&AgentCapability], errors: &[PlanError], remaining_budget: usize) -> String {
    let agent_lines = agents.iter().map(|a| format!("- {}: {}", a.name, a.description)).collect::<Vec<_>>().join("\n");

    let step_summaries = prior
        .steps
        .iter()
        .map(|s| {
            let result_line = match &s.result {
                Some(crate::context::StepResult::Success { output, .. }) => {
                    let text = output.as_ref().map(|v| v.to_string()).unwrap_or_default();
                    format!("SUCCESS - Output: {}", truncate(&text, 200))
                }
                Some(crate::context::StepResult::Failure { error, .. }) => format!("FAILED - {}", truncate(error, 200)),
                Some(crate::context::StepResult::AuthRequired { auth_url, .. }) => format!("AUTH_REQUIRED - {auth_url}"),
                None => "(not yet run)".to_string(),
            };
            format!("[{}] {} ({:?})\nTask: {}\nResult: {}", s.id, s.target, s.status, s.task, result_line)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let error_lines = errors.iter().map(|e| format!("- {}: {}", e.step_id, e.error)).collect::<Vec<_>>().join("\n");

    format!(
        "You are the replanning component of a conversational task assistant.\n\
        Available agents:\n{agent_lines}\n\n\
        Original request: {request}\n\
        Goal: {goal}\n\n\
        Steps so far:\n{step_summaries}\n\n\
        Errors:\n{error_lines}\n\n\
        Remaining step budget: {remaining_budget}\n\n\
        Produce the same JSON shape as the planner: \
        {{\"goal\": \"...\", \"steps\": [{{\"id\": \"...\", \"targetType\": \"agent\"|\"skill\", \"target\": \"...\", \"task\": \"...\"}}]}}. \
        Do not repeat steps already completed. If the goal is fully achieved, return an empty steps list.",
        agent_lines = agent_lines,
        request = prior.user_request,
        goal = prior.goal,
        step_summaries = step_summaries,
        error_lines = if error_lines.is_empty() { "(none)".to_string() } else { error_lines },
        remaining_budget = remaining_budget,
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "…"
    }
}
