//! Conversation Window (`spec.md` §4.4): a pure filter reducing the raw
//! chronological message list to the window relevant for planning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Channel;

/// One turn of stored conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub id: String,
    pub role: ConversationRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub channel: Channel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

impl ConversationRole {
    fn title(&self) -> &'static str {
        match self {
            ConversationRole::User => "User",
            ConversationRole::Assistant => "Assistant",
        }
    }
}

const NO_HISTORY: &str = "(No recent conversation history)";

/// Apply age cap, count cap, then token-budget cap (in that order), per
/// `spec.md` §4.4. Returns the kept subset re-ordered chronologically.
pub fn window_messages(
    messages: &[ConversationMessage],
    now: DateTime<Utc>,
    max_age_hours: i64,
    max_messages: usize,
    max_tokens: usize,
) -> Vec<ConversationMessage> {
    let age_cutoff = now - chrono::Duration::hours(max_age_hours);
    let mut kept: Vec<&ConversationMessage> = messages.iter().filter(|m| m.created_at >= age_cutoff).collect();

    if kept.len() > max_messages {
        kept = kept.split_off(kept.len() - max_messages);
    }

    // Walk newest-to-oldest accumulating an estimated token count; stop as
    // soon as the next (older) message would exceed the budget.
    let mut budgeted: Vec<&ConversationMessage> = Vec::new();
    let mut token_count = 0usize;
    for msg in kept.iter().rev() {
        let estimate = estimate_tokens(&msg.content);
        if token_count + estimate > max_tokens {
            break;
        }
        token_count += estimate;
        budgeted.push(msg);
    }
    budgeted.reverse();

    budgeted.into_iter().cloned().collect()
}

fn estimate_tokens(content: &str) -> usize {
    (content.chars().count() as f64 / 3.3).ceil() as usize
}

/// Formats a window for prompt injection: `"{Role}: {content}"` joined by
/// newlines, or the literal "(No recent conversation history)" if empty.
pub fn format_window(window: &[ConversationMessage]) -> String {
    if window.is_empty() {
        return NO_HISTORY.to_string();
    }
    window
        .iter()
        .map(|m| format!("{}: {}", m.role.title(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
