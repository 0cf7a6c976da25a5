//! End-to-end exercise of the orchestrator loop against the literal
//! replan scenario from `spec.md` §8 scenario 3: an initial email search
//! comes back empty, the orchestrator replans, and the broader search
//! succeeds while the first step's result is preserved untouched.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hermes_core::agents::{AgentCapability, AgentEntry, AgentRegistry, GENERAL_AGENT};
use hermes_core::config::Settings;
use hermes_core::context::{Channel, StepResult};
use hermes_core::llm::{ChatCompletion, ContentBlock, LlmChatClient, LlmError, Message, TokenUsage};
use hermes_core::skills::SkillRegistry;
use hermes_core::stores::{Credential, ConversationStore, CredentialStore, MemoryStore, StoreError, UserConfig, UserConfigStore, UserFact};
use hermes_core::tools::Tool;
use hermes_core::OrchestratorCore;

/// Replays a fixed sequence of completions, one per call, in order:
/// planner call, step-1 agent call, replanner call, step-2 agent call.
struct ScriptedLlm {
    responses: Mutex<Vec<ChatCompletion>>,
}

impl ScriptedLlm {
    fn new(texts: Vec<&str>) -> Self {
        let responses = texts
            .into_iter()
            .map(|t| ChatCompletion {
                content: vec![ContentBlock::Text { text: t.to_string() }],
                usage: TokenUsage { input: 1, output: 1 },
            })
            .collect();
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmChatClient for ScriptedLlm {
    async fn chat(&self, _system: &str, _messages: &[Message], _tools: Option<&[Tool]>, _max_tokens: Option<u32>) -> Result<ChatCompletion, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Transport("scripted client exhausted".into()));
        }
        Ok(responses.remove(0))
    }
}

#[derive(Default)]
struct InMemoryConversations {
    messages: Mutex<HashMap<String, Vec<hermes_core::conversation::ConversationMessage>>>,
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn get_history(&self, user: &str, _limit: usize, _since: Option<chrono::DateTime<chrono::Utc>>) -> Result<Vec<hermes_core::conversation::ConversationMessage>, StoreError> {
        Ok(self.messages.lock().unwrap().get(user).cloned().unwrap_or_default())
    }

    async fn add_message(&self, user: &str, message: hermes_core::conversation::ConversationMessage) -> Result<(), StoreError> {
        self.messages.lock().unwrap().entry(user.to_string()).or_default().push(message);
        Ok(())
    }

    async fn get_message_metadata(&self, _ids: &[String], _kind: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(HashMap::new())
    }
}

#[derive(Default)]
struct EmptyUserConfigs;

#[async_trait]
impl UserConfigStore for EmptyUserConfigs {
    async fn get(&self, _user: &str) -> Result<UserConfig, StoreError> {
        Ok(UserConfig::default())
    }
    async fn set(&self, _user: &str, _partial: UserConfig) -> Result<(), StoreError> {
        Ok(())
    }
    async fn get_email_watcher_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(vec![])
    }
    async fn update_watcher_checkpoint(&self, _user: &str, _token: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

struct NoCredentials;
#[async_trait]
impl CredentialStore for NoCredentials {
    async fn get(&self, _user: &str, _provider: &str) -> Result<Option<Credential>, StoreError> {
        Ok(None)
    }
    async fn set(&self, _user: &str, _credential: Credential) -> Result<(), StoreError> {
        Ok(())
    }
    async fn delete(&self, _user: &str, _provider: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

struct NoMemory;
#[async_trait]
impl MemoryStore for NoMemory {
    async fn get_facts(&self, _user: &str) -> Result<Vec<UserFact>, StoreError> {
        Ok(vec![])
    }
    async fn add_fact(&self, _user: &str, fact: &str, confidence: f64) -> Result<UserFact, StoreError> {
        Ok(UserFact {
            id: "f1".into(),
            fact: fact.into(),
            confidence,
        })
    }
    async fn update_fact(&self, _user: &str, _id: &str, _fact: &str, _confidence: f64) -> Result<(), StoreError> {
        Ok(())
    }
    async fn delete_fact(&self, _user: &str, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn empty_email_search_triggers_replan_that_preserves_the_first_step() {
    let plan_v1 = r#"{"goal": "find the hotel confirmation", "steps": [
        {"id": "step_1", "targetType": "agent", "target": "email-agent", "task": "Search 'Arizona hotel confirmation'"}
    ]}"#;
    let plan_v2 = r#"{"goal": "find the hotel confirmation", "steps": [
        {"id": "step_2", "targetType": "agent", "target": "email-agent", "task": "Broader search 'arizona newer_than:2y'"}
    ]}"#;

    let llm = ScriptedLlm::new(vec![plan_v1, plan_v2]);

    let mut agents = AgentRegistry::new();
    let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = call_count.clone();
    agents.register(AgentEntry {
        capability: AgentCapability {
            name: "email-agent".to_string(),
            description: "searches the user's mailbox".into(),
            tools: vec!["*".into()],
            examples: vec!["Find my hotel confirmation".into()],
        },
        executor: std::sync::Arc::new(move |task, _ctx, _llm, _tools, _max| {
            let counter = counter.clone();
            let task = task.to_string();
            Box::pin(async move {
                let call = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if call == 0 {
                    assert!(task.contains("Arizona hotel confirmation"));
                    StepResult::success(Some(serde_json::json!({"isEmpty": true})))
                } else {
                    assert!(task.contains("arizona newer_than:2y"));
                    StepResult::success(Some(serde_json::Value::String("Found: Scottsdale Resort, Jul 29-31".into())))
                }
            })
        }),
    });
    // general-agent is required as the routing fallback target even though
    // this scenario never falls back to it.
    agents.register(AgentEntry {
        capability: AgentCapability {
            name: GENERAL_AGENT.to_string(),
            description: "fallback".into(),
            tools: vec!["*".into()],
            examples: vec![],
        },
        executor: std::sync::Arc::new(|_task, _ctx, _llm, _tools, _max| Box::pin(async move { StepResult::failure("should not be reached") })),
    });

    let tools = hermes_core::tools::ToolRegistry::new();
    let skills = SkillRegistry::default();
    let conversations = InMemoryConversations::default();
    let user_configs = EmptyUserConfigs;
    let credentials = NoCredentials;
    let memory = NoMemory;

    let core = OrchestratorCore {
        llm: &llm,
        tools: &tools,
        agents: &agents,
        skills: &skills,
        conversations: &conversations,
        user_configs: &user_configs,
        credentials: &credentials,
        memory: &memory,
        settings: Settings::default(),
    };

    let handled = core
        .handle_request("+15551234567", Channel::Sms, "Find my Arizona hotel confirmation")
        .await
        .expect("request handling should not hit a store error");

    assert!(handled.success);
    assert_eq!(handled.plan.version, 2);
    assert_eq!(handled.plan.steps.len(), 2);
    assert_eq!(handled.plan.steps[0].id, "step_1");
    assert!(handled.response.contains("Scottsdale"));
}
