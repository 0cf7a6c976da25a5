//! External collaborator interfaces (`spec.md` §6). The core only ever holds
//! `dyn` trait objects for these — concrete implementations (SQL, REST,
//! etc.) live outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::context::UserProfile;
use crate::conversation::ConversationMessage;
use crate::scheduler::ScheduledJob;

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(s) => write!(f, "not found: {s}"),
            StoreError::Backend(s) => write!(f, "store backend error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A single weighted fact about a user, ranked by confidence (`spec.md`
/// §4.5 "user facts (ranked by confidence)").
#[derive(Debug, Clone, PartialEq)]
pub struct UserFact {
    pub id: String,
    pub fact: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    pub profile: UserProfile,
    pub email_watcher_enabled: bool,
    pub watcher_checkpoint: Option<String>,
}

/// `getHistory`, `addMessage`, `getMessageMetadata` (`spec.md` §6).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_history(&self, user: &str, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<ConversationMessage>, StoreError>;
    async fn add_message(&self, user: &str, message: ConversationMessage) -> Result<(), StoreError>;
    async fn get_message_metadata(&self, ids: &[String], kind: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// `get`, `set`, `getEmailWatcherUsers`, `updateWatcherCheckpoint` (`spec.md` §6).
#[async_trait]
pub trait UserConfigStore: Send + Sync {
    async fn get(&self, user: &str) -> Result<UserConfig, StoreError>;
    async fn set(&self, user: &str, partial: UserConfig) -> Result<(), StoreError>;
    async fn get_email_watcher_users(&self) -> Result<Vec<String>, StoreError>;
    async fn update_watcher_checkpoint(&self, user: &str, token: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// `get`, `set`, `delete` (`spec.md` §6). Implementations are expected to
/// additionally cache authenticated clients keyed by user, with entries
/// expiring before their underlying token (`spec.md` §5 "Shared resources").
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user: &str, provider: &str) -> Result<Option<Credential>, StoreError>;
    async fn set(&self, user: &str, credential: Credential) -> Result<(), StoreError>;
    async fn delete(&self, user: &str, provider: &str) -> Result<(), StoreError>;
}

/// `getFacts`, `addFact`, `updateFact`, `deleteFact` (`spec.md` §6).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get_facts(&self, user: &str) -> Result<Vec<UserFact>, StoreError>;
    async fn add_fact(&self, user: &str, fact: &str, confidence: f64) -> Result<UserFact, StoreError>;
    async fn update_fact(&self, user: &str, id: &str, fact: &str, confidence: f64) -> Result<(), StoreError>;
    async fn delete_fact(&self, user: &str, id: &str) -> Result<(), StoreError>;
}

/// `getDueJobs`, `updateJob`, plus CRUD (`spec.md` §6).
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_due_jobs(&self, now_seconds: i64) -> Result<Vec<ScheduledJob>, StoreError>;
    async fn update_job(&self, id: &str, patch: JobPatch) -> Result<(), StoreError>;
    async fn create_job(&self, job: ScheduledJob) -> Result<(), StoreError>;
    async fn delete_job(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub next_run_at: Option<i64>,
    pub last_run_at: Option<i64>,
    pub enabled: Option<bool>,
}

/// `send(user, channel, body)` (`spec.md` §6).
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, user: &str, channel: crate::context::Channel, body: &str) -> Result<(), StoreError>;
}
