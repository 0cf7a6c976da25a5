//! Background Watcher / Skill Matcher (`spec.md` §4.12): polls each
//! watcher-enabled, credentialed user for new inbound domain items, matches
//! them against the skill registry, and sends a throttled notification per
//! matched item.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::agents::AgentRegistry;
use crate::context::{Channel, ExecutionContext};
use crate::llm::LlmChatClient;
use crate::poller::IntervalPoller;
use crate::skills::SkillRegistry;
use crate::stores::{CredentialStore, StoreError, UserConfigStore};
use crate::tools::ToolRegistry;

/// One new inbound item surfaced by a domain sync pass (e.g. one email).
#[derive(Debug, Clone)]
pub struct DomainItem {
    pub id: String,
    /// Text assembled for skill matching (`spec.md` §4.12 "assemble a match text").
    pub match_text: String,
    /// Opaque checkpoint token advanced once this item (and everything
    /// before it) has been processed.
    pub checkpoint: String,
}

/// The external collaborator fetching deltas since a checkpoint (`spec.md`
/// §4.12 "domain sync layer"). A concrete implementation talks to a mailbox,
/// calendar, or similar provider; out of scope for this crate (`spec.md` §1).
#[async_trait]
pub trait DomainSync: Send + Sync {
    async fn fetch_since(&self, user: &str, checkpoint: Option<&str>) -> Result<Vec<DomainItem>, StoreError>;
}

/// `{count, windowStart}`, 1h window (`spec.md` §3 `WatcherThrottleState`).
#[derive(Debug, Clone, Copy)]
struct ThrottleState {
    count: u32,
    window_start: DateTime<Utc>,
}

impl ThrottleState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self { count: 0, window_start: now }
    }

    /// Returns whether a send is allowed right now, incrementing the count
    /// if so. Rolls the window over when it has expired.
    fn try_consume(&mut self, now: DateTime<Utc>, max_per_hour: u32) -> bool {
        if now - self.window_start >= chrono::Duration::hours(1) {
            *self = ThrottleState::fresh(now);
        }
        if self.count >= max_per_hour {
            return false;
        }
        self.count += 1;
        true
    }
}

/// Per-user throttle state, owned exclusively by the watcher's own poller
/// task — single-writer, so a plain map behind a `Mutex` suffices with no
/// cross-task lock contention in practice (`spec.md` §5).
#[derive(Default)]
struct ThrottleMap(Mutex<HashMap<String, ThrottleState>>);

impl ThrottleMap {
    async fn allow_send(&self, user: &str, now: DateTime<Utc>, max_per_hour: u32) -> bool {
        let mut map = self.0.lock().await;
        let state = map.entry(user.to_string()).or_insert_with(|| ThrottleState::fresh(now));
        state.try_consume(now, max_per_hour)
    }
}

pub struct Watcher<'a> {
    pub user_configs: &'a (dyn UserConfigStore + 'a),
    pub credentials: &'a (dyn CredentialStore + 'a),
    pub domain_sync: &'a (dyn DomainSync + 'a),
    pub skills: &'a SkillRegistry,
    pub agents: &'a AgentRegistry,
    pub llm: &'a dyn LlmChatClient,
    pub tools: &'a ToolRegistry,
    pub outbound: &'a (dyn crate::stores::OutboundSender + 'a),
    pub max_tool_iterations: usize,
    pub confidence_threshold: f64,
    pub max_notifications_per_hour: u32,
    throttle: ThrottleMap,
}

impl<'a> Watcher<'a> {
    pub fn new(
        user_configs: &'a (dyn UserConfigStore + 'a),
        credentials: &'a (dyn CredentialStore + 'a),
        domain_sync: &'a (dyn DomainSync + 'a),
        skills: &'a SkillRegistry,
        agents: &'a AgentRegistry,
        llm: &'a dyn LlmChatClient,
        tools: &'a ToolRegistry,
        outbound: &'a (dyn crate::stores::OutboundSender + 'a),
        max_tool_iterations: usize,
        confidence_threshold: f64,
        max_notifications_per_hour: u32,
    ) -> Self {
        Self {
            user_configs,
            credentials,
            domain_sync,
            skills,
            agents,
            llm,
            tools,
            outbound,
            max_tool_iterations,
            confidence_threshold,
            max_notifications_per_hour,
            throttle: ThrottleMap::default(),
        }
    }

    pub fn into_poller(self: Arc<Self>, interval_ms: u64) -> IntervalPoller
    where
        Self: 'static,
    {
        let watcher = self;
        IntervalPoller::new(Duration::from_millis(interval_ms), move || {
            let watcher = watcher.clone();
            async move { watcher.tick().await }
        })
    }

    /// One poll of every eligible user, sequentially (`spec.md` §4.12 "sequential
    /// to cap external API load").
    #[instrument(level = "debug", skip(self))]
    pub async fn tick(&self) {
        let users = match self.user_configs.get_email_watcher_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "failed to list watcher-enabled users");
                return;
            }
        };

        for user in users {
            if let Err(e) = self.process_user(&user).await {
                warn!(user = %user, error = %e, "watcher pass failed for user, skipping");
            }
        }
    }

    async fn process_user(&self, user: &str) -> Result<(), StoreError> {
        if self.credentials.get(user, "email").await?.is_none() {
            return Ok(());
        }

        let config = self.user_configs.get(user).await?;
        let items = self.domain_sync.fetch_since(user, config.watcher_checkpoint.as_deref()).await?;

        for item in items {
            self.process_item(user, &item).await;
            self.user_configs.update_watcher_checkpoint(user, &item.checkpoint).await?;
        }
        Ok(())
    }

    async fn process_item(&self, user: &str, item: &DomainItem) {
        let Some(skill) = self.skills.match_for_message(&item.match_text, Channel::Email, self.confidence_threshold) else {
            return;
        };

        let now = Utc::now();
        let ctx = ExecutionContext::new(user, Channel::Email, now);
        let result = self
            .skills
            .execute_by_name(&skill.name, &item.match_text, &ctx, self.llm, self.tools, self.agents, self.max_tool_iterations)
            .await;

        if !result.success {
            return;
        }
        let Some(output) = result.output.filter(|o| !o.trim().is_empty()) else {
            return;
        };

        // One notification per matched item, subject to the 1h throttle cap
        // (`spec.md` §4.12 step 2.d, §3 `WatcherThrottleState`).
        if !self.throttle.allow_send(user, now, self.max_notifications_per_hour).await {
            info!(user = %user, item = %item.id, "watcher notification throttled");
            return;
        }

        if let Err(e) = self.outbound.send(user, Channel::Sms, &output).await {
            warn!(user = %user, item = %item.id, error = %e, "failed to send watcher notification");
        }
    }
}
