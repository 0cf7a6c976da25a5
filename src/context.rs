//! The data model shared by every invocation (`spec.md` §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::TokenUsage;
use crate::tools::ToolCall;

/// Inbound channel a request arrived on / a reply must be sent back on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Whatsapp,
    /// Used internally by the background watcher (`spec.md` §4.12) and the
    /// scheduled-job runner when matching skills against channels; never a
    /// real inbound transport.
    Email,
    Scheduler,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
            Channel::Email => "email",
            Channel::Scheduler => "scheduler",
        }
    }
}

/// Per-user profile data the planner and agents may consult.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub feature_flags: Vec<String>,
}

/// Outcome of any single agent/skill/tool invocation (`spec.md` §3).
///
/// Modeled as a tagged variant rather than an untyped map, per the design
/// note in `spec.md` §9 ("Represent StepResult as a tagged variant...").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Success {
        output: Option<Value>,
        tool_calls: Vec<ToolCall>,
        token_usage: Option<TokenUsage>,
    },
    Failure {
        error: String,
        /// Set by a callee that knows its own failure is safe to retry
        /// (`spec.md` §4.6 step 7). The step executor's transient classifier
        /// also applies independently of this flag.
        retryable: bool,
        tool_calls: Vec<ToolCall>,
        token_usage: Option<TokenUsage>,
    },
    AuthRequired {
        auth_url: String,
        tool_calls: Vec<ToolCall>,
        token_usage: Option<TokenUsage>,
    },
}

impl StepResult {
    pub fn success(output: Option<Value>) -> Self {
        StepResult::Success {
            output,
            tool_calls: Vec::new(),
            token_usage: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        StepResult::Failure {
            error: error.into(),
            retryable: false,
            tool_calls: Vec::new(),
            token_usage: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match self {
            StepResult::Success { output, .. } => output.as_ref(),
            _ => None,
        }
    }

    pub fn needs_replan(&self) -> bool {
        self.output()
            .and_then(|v| v.get("needsReplan"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_empty_result(&self) -> bool {
        self.output()
            .and_then(|v| v.get("isEmpty"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn auth_url(&self) -> Option<&str> {
        match self {
            StepResult::AuthRequired { auth_url, .. } => Some(auth_url.as_str()),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            StepResult::Failure { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

/// The read-only per-request bundle carried to every agent/skill/tool
/// invocation (`spec.md` §3).
#[derive(Clone)]
pub struct ExecutionContext {
    pub user: String,
    pub channel: Channel,
    pub profile: Option<UserProfile>,
    pub step_results: HashMap<String, StepResult>,
    pub media_context: Option<String>,
    /// Current time, threaded explicitly so planning/window/cron logic stays
    /// deterministic and testable (never read the wall clock directly from
    /// inside a component).
    pub now: chrono::DateTime<chrono::Utc>,
}

impl ExecutionContext {
    pub fn new(user: impl Into<String>, channel: Channel, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            user: user.into(),
            channel,
            profile: None,
            step_results: HashMap::new(),
            media_context: None,
            now,
        }
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        self.profile
            .as_ref()
            .and_then(|p| p.timezone.as_deref())
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(chrono_tz::UTC)
    }
}
