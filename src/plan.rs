//! Plan data model (`spec.md` §3): `PlanStep`, `ExecutionPlan`, `PlanContext`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::StepResult;
use crate::conversation::ConversationMessage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Agent,
    Skill,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One invocation of an agent or skill (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub target_type: TargetType,
    pub target: String,
    pub task: String,
    pub status: StepStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<StepResult>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, target_type: TargetType, target: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_type,
            target: target.into(),
            task: task.into(),
            status: StepStatus::Pending,
            retry_count: 0,
            max_retries: 2,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

/// An ordered, versioned list of steps chosen to satisfy a user request
/// (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub user_request: String,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn first_pending_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    pub fn all_terminal(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped))
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }
}

/// The planner/replanner-facing view of a request's context (`spec.md` §3):
/// everything [`crate::planner::Planner::create`] and
/// [`crate::replanner::Replanner::replan`] need to build their prompts,
/// gathered once per `handle_request` call.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub user_message: String,
    pub history_window: Vec<ConversationMessage>,
    /// `(fact, confidence)` pairs, as returned by the memory store
    /// (`spec.md` §4.5 "user facts (ranked by confidence)").
    pub user_facts: Vec<(String, f64)>,
    pub phone: String,
    pub channel: crate::context::Channel,
    pub user_config: crate::stores::UserConfig,
    pub step_results: HashMap<String, StepResult>,
    pub errors: Vec<PlanError>,
}

impl PlanContext {
    /// The user's configured timezone, defaulting to UTC — mirrors
    /// [`crate::context::ExecutionContext::timezone`].
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.user_config
            .profile
            .timezone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC)
    }
}

#[derive(Debug, Clone)]
pub struct PlanError {
    pub step_id: String,
    pub error: String,
}
