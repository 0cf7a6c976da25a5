//! Tool-Execution Surface (`spec.md` §4.1).
//!
//! Drives an LLM chat loop that may repeatedly emit `tool_use` requests,
//! resolving each against the registry and feeding the result back until the
//! model returns plain text or the iteration budget is exhausted.

use std::fmt;

use tracing::instrument;

use crate::context::{ExecutionContext, StepResult};
use crate::llm::{ChatCompletion, ContentBlock, LlmChatClient, LlmError, Message, TokenUsage};
use crate::tools::ToolRegistry;

#[derive(Debug)]
pub enum SurfaceError {
    Llm(LlmError),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::Llm(e) => write!(f, "tool surface LLM error: {e}"),
        }
    }
}

impl std::error::Error for SurfaceError {}

impl From<LlmError> for SurfaceError {
    fn from(e: LlmError) -> Self {
        SurfaceError::Llm(e)
    }
}

/// Drives the tool-call loop for a single agent/skill invocation.
///
/// Holds no state of its own beyond the registry and the iteration cap; every
/// call to [`ToolExecutionSurface::execute`] is independent, matching the
/// teacher's pattern of a stateless `invoke`/`call_tools` pair threaded
/// through a mutable agent.
pub struct ToolExecutionSurface<'a> {
    llm: &'a dyn LlmChatClient,
    registry: &'a ToolRegistry,
    max_tool_iterations: usize,
}

impl<'a> ToolExecutionSurface<'a> {
    pub fn new(llm: &'a dyn LlmChatClient, registry: &'a ToolRegistry, max_tool_iterations: usize) -> Self {
        Self {
            llm,
            registry,
            max_tool_iterations,
        }
    }

    /// `execute(systemPrompt, task, allowedToolNames, ctx) → StepResult` per
    /// `spec.md` §4.1, with an extra `initial_messages` slice the scheduled-job
    /// runner uses to inject an original-user-request preamble (§4.11).
    #[instrument(level = "debug", skip(self, ctx, initial_messages), fields(task_len = task.len()))]
    pub async fn execute(
        &self,
        system_prompt: &str,
        task: &str,
        allowed_tool_names: &[String],
        ctx: &ExecutionContext,
        initial_messages: &[Message],
    ) -> StepResult {
        let tools = self.registry.resolve(allowed_tool_names);
        let tool_schema = if tools.is_empty() { None } else { Some(tools.as_slice()) };

        let mut messages: Vec<Message> = Vec::with_capacity(initial_messages.len() + 1);
        messages.extend(initial_messages.iter().cloned());
        messages.push(Message::user(task));

        let mut accumulated_calls = Vec::new();
        let mut usage = TokenUsage::default();

        for _ in 0..self.max_tool_iterations {
            let completion = match self.llm.chat(system_prompt, &messages, tool_schema, None).await {
                Ok(c) => c,
                Err(e) => {
                    return StepResult::Failure {
                        error: SurfaceError::from(e).to_string(),
                        retryable: true,
                        tool_calls: accumulated_calls,
                        token_usage: Some(usage),
                    }
                }
            };
            usage.accumulate(completion.usage);

            let tool_uses = completion.tool_uses();
            if tool_uses.is_empty() {
                if let Some(text) = completion.text() {
                    return StepResult::Success {
                        output: Some(serde_json::Value::String(text)),
                        tool_calls: accumulated_calls,
                        token_usage: Some(usage),
                    };
                }
                // No text and no tool_use: treat as an empty, successful turn
                // rather than stalling the loop.
                return StepResult::Success {
                    output: None,
                    tool_calls: accumulated_calls,
                    token_usage: Some(usage),
                };
            }

            self.append_assistant_turn(&mut messages, &completion);

            for block in tool_uses {
                let ContentBlock::ToolUse { id, name, input } = block else {
                    continue;
                };
                accumulated_calls.push(crate::tools::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });

                let result_text = match self.registry.get(name) {
                    Some(tool) => match tool.execute(input.clone(), ctx.clone()).await {
                        Ok(value) => {
                            if let Some(auth_url) = auth_required_url(&value) {
                                return StepResult::AuthRequired {
                                    auth_url,
                                    tool_calls: accumulated_calls,
                                    token_usage: Some(usage),
                                };
                            }
                            value.to_string()
                        }
                        Err(e) => format!("error executing tool {name}: {e}"),
                    },
                    None => format!("tool not found: {name}"),
                };
                messages.push(Message::tool(result_text, id.clone()));
            }
        }

        StepResult::Failure {
            error: "tool loop exceeded".to_string(),
            retryable: false,
            tool_calls: accumulated_calls,
            token_usage: Some(usage),
        }
    }

    /// Serializes the assistant's tool-use turn back into the message list so
    /// the next LLM call sees what it already asked for.
    fn append_assistant_turn(&self, messages: &mut Vec<Message>, completion: &ChatCompletion) {
        let summary = completion
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ToolUse { name, input, .. } => format!("[tool_use {name}: {input}]"),
            })
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(Message::assistant(summary));
    }
}

/// A tool result shaped `{"auth_required": true, "auth_url": "..."}` marks an
/// OAuth-style reconnect requirement (`spec.md` §4.1/§4.9); any other shape,
/// including `auth_required: false`, is treated as an ordinary tool result.
fn auth_required_url(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;
    if obj.get("auth_required")?.as_bool()? {
        obj.get("auth_url").and_then(|v| v.as_str()).map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::Channel;
    use crate::llm::test_double::ScriptedLlmClient;
    use crate::tools::{Function, FunctionParameters, ToolType};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("+15551234567", Channel::Sms, chrono::Utc::now())
    }

    #[tokio::test]
    async fn returns_text_when_no_tool_use() {
        let llm = ScriptedLlmClient::text_once("Hi there!");
        let registry = ToolRegistry::new();
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);
        let result = surface.execute("sys", "greet", &[], &ctx(), &[]).await;
        assert!(result.is_success());
        assert_eq!(
            result.output().and_then(|v| v.as_str()),
            Some("Hi there!")
        );
    }

    #[tokio::test]
    async fn invokes_registered_tool_and_returns_final_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Tool {
            tool_type: ToolType::Function,
            function: Function {
                name: "echo".into(),
                description: "echoes input".into(),
                parameters: FunctionParameters {
                    param_type: "object".into(),
                    properties: Default::default(),
                    required: vec![],
                },
            },
            executor: std::sync::Arc::new(|input, _ctx| Box::pin(async move { Ok(input) })),
        });

        let tool_call = ChatCompletion {
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "echo".into(),
                input: json!({"msg": "hi"}),
            }],
            usage: TokenUsage { input: 5, output: 5 },
        };
        let final_text = ChatCompletion {
            content: vec![ContentBlock::Text {
                text: "done".into(),
            }],
            usage: TokenUsage { input: 2, output: 2 },
        };
        let llm = ScriptedLlmClient::new(vec![tool_call, final_text]);
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);

        let result = surface.execute("sys", "do the thing", &["*".to_string()], &ctx(), &[]).await;
        assert!(result.is_success());
        assert_eq!(result.output().and_then(|v| v.as_str()), Some("done"));
        if let StepResult::Success { token_usage, .. } = &result {
            let usage = token_usage.unwrap();
            assert_eq!(usage.input, 7);
            assert_eq!(usage.output, 7);
        }
    }

    #[tokio::test]
    async fn missing_tool_surfaces_as_tool_result_not_crash() {
        let registry = ToolRegistry::new();
        let tool_call = ChatCompletion {
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "does-not-exist".into(),
                input: json!({}),
            }],
            usage: TokenUsage::default(),
        };
        let final_text = ChatCompletion {
            content: vec![ContentBlock::Text {
                text: "recovered".into(),
            }],
            usage: TokenUsage::default(),
        };
        let llm = ScriptedLlmClient::new(vec![tool_call, final_text]);
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);
        let result = surface.execute("sys", "task", &["*".to_string()], &ctx(), &[]).await;
        assert!(result.is_success());
        assert_eq!(result.output().and_then(|v| v.as_str()), Some("recovered"));
    }

    #[tokio::test]
    async fn tool_reporting_auth_required_short_circuits_the_loop() {
        let mut registry = ToolRegistry::new();
        registry.register(Tool {
            tool_type: ToolType::Function,
            function: Function {
                name: "send-calendar-invite".into(),
                description: "needs an oauth reconnect".into(),
                parameters: FunctionParameters {
                    param_type: "object".into(),
                    properties: Default::default(),
                    required: vec![],
                },
            },
            executor: std::sync::Arc::new(|_, _| {
                Box::pin(async {
                    Ok(json!({"auth_required": true, "auth_url": "https://example.com/oauth/calendar"}))
                })
            }),
        });

        let tool_call = ChatCompletion {
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "send-calendar-invite".into(),
                input: json!({}),
            }],
            usage: TokenUsage { input: 1, output: 1 },
        };
        // Only one completion is scripted: a second LLM call would mean the
        // loop kept going instead of short-circuiting on auth_required.
        let llm = ScriptedLlmClient::new(vec![tool_call]);
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);

        let result = surface.execute("sys", "schedule the meeting", &["*".to_string()], &ctx(), &[]).await;
        match result {
            StepResult::AuthRequired { auth_url, .. } => {
                assert_eq!(auth_url, "https://example.com/oauth/calendar");
            }
            other => panic!("expected AuthRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_reporting_auth_required_false_is_treated_as_ordinary_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Tool {
            tool_type: ToolType::Function,
            function: Function {
                name: "check-status".into(),
                description: "reports auth_required: false".into(),
                parameters: FunctionParameters {
                    param_type: "object".into(),
                    properties: Default::default(),
                    required: vec![],
                },
            },
            executor: std::sync::Arc::new(|_, _| Box::pin(async { Ok(json!({"auth_required": false, "ok": true})) })),
        });

        let tool_call = ChatCompletion {
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "check-status".into(),
                input: json!({}),
            }],
            usage: TokenUsage::default(),
        };
        let final_text = ChatCompletion {
            content: vec![ContentBlock::Text { text: "all good".into() }],
            usage: TokenUsage::default(),
        };
        let llm = ScriptedLlmClient::new(vec![tool_call, final_text]);
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);

        let result = surface.execute("sys", "task", &["*".to_string()], &ctx(), &[]).await;
        assert!(result.is_success());
        assert_eq!(result.output().and_then(|v| v.as_str()), Some("all good"));
    }

    #[tokio::test]
    async fn iteration_cap_surfaces_as_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(Tool {
            tool_type: ToolType::Function,
            function: Function {
                name: "loopy".into(),
                description: "never stops".into(),
                parameters: FunctionParameters {
                    param_type: "object".into(),
                    properties: Default::default(),
                    required: vec![],
                },
            },
            executor: std::sync::Arc::new(|_, _| Box::pin(async { Ok(json!("ok")) })),
        });

        let always_tool_use = || ChatCompletion {
            content: vec![ContentBlock::ToolUse {
                id: "call".into(),
                name: "loopy".into(),
                input: json!({}),
            }],
            usage: TokenUsage::default(),
        };
        let llm = ScriptedLlmClient::new((0..10).map(|_| always_tool_use()).collect());
        let surface = ToolExecutionSurface::new(&llm, &registry, 10);
        let result = surface.execute("sys", "task", &["*".to_string()], &ctx(), &[]).await;
        assert!(!result.is_success());
        assert_eq!(result.error_message(), Some("tool loop exceeded"));
    }
}
