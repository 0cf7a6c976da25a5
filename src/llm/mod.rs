//! The LLM chat endpoint contract (`spec.md` §6).
//!
//! The core never talks to a concrete model vendor directly — it only ever
//! holds a `dyn LlmChatClient`, handed in by the caller at startup. Concrete
//! provider wiring (OpenAI, Anthropic, a self-hosted model, ...) lives outside
//! this crate.

mod message;

pub use message::{Message, Role};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::Tool;

/// A single block of assistant output: either prose or a request to invoke a
/// tool. Mirrors the `{content: [TextBlock|ToolUseBlock], usage}` contract in
/// `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

/// Token accounting returned alongside every chat completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.input += other.input;
        self.output += other.output;
    }
}

/// Result of one call to the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub content: Vec<ContentBlock>,
    pub usage: TokenUsage,
}

impl ChatCompletion {
    /// Convenience accessor for the tool-use blocks in this completion, if
    /// any. The tool-execution surface loops until this is empty.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
            .collect()
    }

    /// The concatenated text blocks, if the completion produced any.
    pub fn text(&self) -> Option<String> {
        let joined: String = self
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[derive(Debug)]
pub enum LlmError {
    Transport(String),
    InvalidResponse(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Transport(e) => write!(f, "LLM transport error: {e}"),
            LlmError::InvalidResponse(e) => write!(f, "LLM returned an invalid response: {e}"),
        }
    }
}

impl std::error::Error for LlmError {}

/// The external collaborator contract from `spec.md` §6: `chat(system,
/// messages, tools?, maxTokens) → {content, usage}`.
#[async_trait]
pub trait LlmChatClient: Send + Sync {
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
        max_tokens: Option<u32>,
    ) -> Result<ChatCompletion, LlmError>;
}

#[cfg(test)]
pub mod test_double {
    //! A scriptable `LlmChatClient` used throughout this crate's tests.

    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed sequence of completions, one per call to `chat`. Panics
    /// if exhausted, so tests fail loudly instead of hanging.
    pub struct ScriptedLlmClient {
        responses: Mutex<Vec<ChatCompletion>>,
    }

    impl ScriptedLlmClient {
        pub fn new(responses: Vec<ChatCompletion>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }

        pub fn text_once(text: impl Into<String>) -> Self {
            Self::new(vec![ChatCompletion {
                content: vec![ContentBlock::Text { text: text.into() }],
                usage: TokenUsage { input: 1, output: 1 },
            }])
        }
    }

    #[async_trait]
    impl LlmChatClient for ScriptedLlmClient {
        async fn chat(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: Option<&[Tool]>,
            _max_tokens: Option<u32>,
        ) -> Result<ChatCompletion, LlmError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Transport("scripted client exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }
}
