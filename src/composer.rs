//! Response Composer (`spec.md` §4.9): deterministic assembler of the
//! user-facing reply from a completed plan's step outputs.

use crate::context::{Channel, StepResult};
use crate::plan::{ExecutionPlan, StepStatus};

const GENERIC_FAILURE_REPLY: &str = "I couldn't complete that. Please try again or rephrase your request.";
const SMS_CANNED_ACK: &str = "Got it — working on a longer reply, I'll follow up shortly.";
const SMS_MAX_CHARS: usize = 160;

/// Picks the last `completed` step whose output is a non-empty string as the
/// primary reply body. An `auth_required` marker on any step result always
/// wins and its URL is included verbatim (`spec.md` §4.9).
pub fn synthesize(plan: &ExecutionPlan) -> String {
    if let Some(auth_url) = find_auth_required(plan) {
        return format!("I need you to reconnect an account before I can continue: {auth_url}");
    }

    plan.steps
        .iter()
        .rev()
        .filter(|s| s.status == StepStatus::Completed)
        .filter_map(|s| s.result.as_ref())
        .filter_map(text_output)
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE_REPLY.to_string())
}

fn find_auth_required(plan: &ExecutionPlan) -> Option<&str> {
    plan.steps.iter().find_map(|s| match &s.result {
        Some(StepResult::AuthRequired { auth_url, .. }) => Some(auth_url.as_str()),
        _ => None,
    })
}

fn text_output(result: &StepResult) -> Option<String> {
    match result {
        StepResult::Success { output: Some(v), .. } => match v {
            serde_json::Value::String(s) => Some(s.clone()),
            other => other.as_str().map(str::to_string),
        },
        _ => None,
    }
}

/// Channel-specific length clamp (`spec.md` §4.9: "enforced by the caller";
/// shipped here as a convenience since there's no other natural owner).
/// SMS bodies over 160 chars are replaced by a canned acknowledgment; other
/// channels pass through unclamped.
pub fn clamp_for_channel(reply: &str, channel: Channel) -> String {
    match channel {
        Channel::Sms if reply.chars().count() > SMS_MAX_CHARS => SMS_CANNED_ACK.to_string(),
        _ => reply.to_string(),
    }
}
