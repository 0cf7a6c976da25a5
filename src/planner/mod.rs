//! Planner (`spec.md` §4.5): turns a user message plus context into an
//! `ExecutionPlan`.

mod dates;

pub use dates::resolve_task_dates;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::agents::{AgentCapability, GENERAL_AGENT};
use crate::conversation::format_window;
use crate::llm::LlmChatClient;
use crate::plan::{ExecutionPlan, PlanContext, PlanStatus, PlanStep, TargetType};
use crate::skills::LoadedSkill;

const MAX_FACT_CHARS: usize = 2000;

/// Shape-validated LLM planner/replanner output (`SPEC_FULL.md` §9: "every
/// parsed LLM JSON must be shape-validated ... malformed input falls through
/// to the fallback plan rather than propagating a partial object"). Shared
/// with [`crate::replanner`], which produces the same JSON contract.
#[derive(Debug, Deserialize)]
pub(crate) struct RawPlan {
    pub(crate) goal: String,
    pub(crate) steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStep {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(rename = "targetType")]
    pub(crate) target_type: String,
    pub(crate) target: String,
    pub(crate) task: String,
}

pub struct Planner<'a> {
    llm: &'a dyn LlmChatClient,
    max_total_steps: usize,
}

impl<'a> Planner<'a> {
    pub fn new(llm: &'a dyn LlmChatClient, max_total_steps: usize) -> Self {
        Self { llm, max_total_steps }
    }

    /// Produce an `ExecutionPlan` with 0..=`max_total_steps` steps
    /// (`spec.md` §4.5). Parse failure yields a single-step fallback plan
    /// targeting `general-agent`, so the system degrades gracefully.
    #[instrument(level = "debug", skip(self, ctx, agents, skills, media_summary))]
    pub async fn create(
        &self,
        ctx: &PlanContext,
        agents: &[&AgentCapability],
        skills: &[&LoadedSkill],
        media_summary: Option<&str>,
        now: DateTime<Utc>,
    ) -> ExecutionPlan {
        let tz = ctx.timezone();
        let prompt = self.build_prompt(ctx, agents, skills, media_summary, now, tz);

        let raw = match self.llm.chat(&prompt.system, &[crate::llm::Message::user(&prompt.user)], None, None).await {
            Ok(completion) => completion.text(),
            Err(e) => {
                warn!(error = %e, "planner LLM call failed, falling back");
                None
            }
        };

        let parsed = raw.and_then(|text| parse_plan_json(&text));

        let mut plan = match parsed {
            Some(raw_plan) => self.materialize(raw_plan, &ctx.user_message, now),
            None => self.fallback_plan(&ctx.user_message, now),
        };

        resolve_task_dates(&mut plan.steps, now, tz);
        plan
    }

    fn materialize(&self, raw: RawPlan, user_message: &str, now: DateTime<Utc>) -> ExecutionPlan {
        let mut steps = Vec::new();
        let mut seen_ids = std::collections::HashSet::new();
        for (idx, raw_step) in raw.steps.into_iter().enumerate() {
            if steps.len() >= self.max_total_steps {
                break;
            }
            let Some(target_type) = parse_target_type(&raw_step.target_type) else {
                continue;
            };
            let id = if seen_ids.insert(raw_step.id.clone()) {
                raw_step.id
            } else {
                format!("step_{}", idx + 1)
            };
            steps.push(PlanStep::new(id, target_type, raw_step.target, raw_step.task));
        }

        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            user_request: user_message.to_string(),
            goal: raw.goal,
            steps,
            status: PlanStatus::Executing,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn fallback_plan(&self, user_message: &str, now: DateTime<Utc>) -> ExecutionPlan {
        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            user_request: user_message.to_string(),
            goal: "respond to user".to_string(),
            steps: vec![PlanStep::new("step_1", TargetType::Agent, GENERAL_AGENT, user_message)],
            status: PlanStatus::Executing,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn build_prompt(
        &self,
        ctx: &PlanContext,
        agents: &[&AgentCapability],
        skills: &[&LoadedSkill],
        media_summary: Option<&str>,
        now: DateTime<Utc>,
        tz: chrono_tz::Tz,
    ) -> PromptParts {
        let mut facts_sorted = ctx.user_facts.clone();
        facts_sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut facts_str = facts_sorted
            .iter()
            .map(|(fact, confidence)| format!("- {fact} (confidence {confidence:.2})"))
            .collect::<Vec<_>>()
            .join("\n");
        if facts_str.len() > MAX_FACT_CHARS {
            facts_str.truncate(MAX_FACT_CHARS);
        }

        let agent_lines = agents
            .iter()
            .map(|a| format!("- {}: {}\n    Examples: {}", a.name, a.description, a.examples.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        let skill_lines = skills
            .iter()
            .filter(|s| s.channels.contains(&ctx.channel))
            .map(|s| format!("- {}: {} (hints: {})", s.name, s.description, s.match_hints.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are the planning component of a conversational task assistant.\n\
            Current time ({tz}): {now}\n\
            User profile name: {name}\n\
            User facts:\n{facts}\n\n\
            Recent conversation:\n{history}\n\n\
            Available agents:\n{agents}\n\n\
            Available skills (channel={channel}):\n{skills}\n\n\
            {media}\
            Rules: produce at most {max_steps} steps; prefer a skill over an agent when one clearly \
            fits; use general-agent only as a fallback; steps must be ordered and may reference \
            earlier step ids. Respond with a single JSON object: \
            {{\"goal\": \"...\", \"steps\": [{{\"id\": \"step_1\", \"targetType\": \"agent\"|\"skill\", \
            \"target\": \"name\", \"task\": \"...\"}}]}}.",
            tz = tz,
            now = now.with_timezone(&tz).to_rfc3339(),
            name = ctx.user_config.profile.name.as_deref().unwrap_or("(unknown)"),
            facts = if facts_str.is_empty() { "(none)".to_string() } else { facts_str },
            history = format_window(&ctx.history_window),
            agents = agent_lines,
            skills = skill_lines,
            media = media_summary.map(|m| format!("Media context:\n{m}\n\n")).unwrap_or_default(),
            channel = ctx.channel.as_str(),
            max_steps = self.max_total_steps,
        );

        PromptParts {
            system,
            user: ctx.user_message.clone(),
        }
    }
}

struct PromptParts {
    system: String,
    user: String,
}

pub(crate) fn parse_target_type(s: &str) -> Option<TargetType> {
    match s {
        "agent" => Some(TargetType::Agent),
        "skill" => Some(TargetType::Skill),
        _ => None,
    }
}

/// Parses the planner's JSON output, tolerating a markdown code fence wrapper
/// (`spec.md` §4.5).
pub fn parse_plan_json(text: &str) -> Option<RawPlan> {
    let stripped = strip_code_fence(text);
    serde_json::from_str(&stripped).ok()
}

fn strip_code_fence(text: &str) -> String {
    let fence_re = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap();
    if let Some(caps) = fence_re.captures(text.trim()) {
        caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| text.to_string())
    } else {
        text.trim().to_string()
    }
}
