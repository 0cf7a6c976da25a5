//! Orchestrator-wide limits and poller intervals.
//!
//! Everything here has a sane default so the core runs out of the box; values
//! can be overridden from the environment (`HERMES_*`) for deployment-specific
//! tuning. See `spec.md` §4.8 for where the four core limits come from.

use std::fmt;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Single source of truth for the orchestrator's hard limits.
///
/// These mirror `spec.md` §4.8 ("Limits (single source of truth)") exactly;
/// don't duplicate these numbers elsewhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub max_total_steps: usize,
    pub max_replans: usize,
    pub max_execution_time_ms: u64,
    pub max_tool_iterations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_total_steps: 8,
            max_replans: 2,
            max_execution_time_ms: 120_000,
            max_tool_iterations: 10,
        }
    }
}

/// Conversation-window sizing (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowLimits {
    pub max_age_hours: i64,
    pub max_messages: usize,
    pub max_tokens: usize,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            max_messages: 20,
            max_tokens: 4000,
        }
    }
}

/// Background poller cadence and watcher throttling (`spec.md` §4.11, §4.12).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingLimits {
    pub scheduler_interval_ms: u64,
    pub watcher_interval_ms: u64,
    pub max_notifications_per_hour: u32,
}

impl Default for PollingLimits {
    fn default() -> Self {
        Self {
            scheduler_interval_ms: 60_000,
            watcher_interval_ms: 30_000,
            max_notifications_per_hour: 3,
        }
    }
}

/// Skill-matching confidence threshold (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkillLimits {
    pub confidence_threshold: f64,
}

impl Default for SkillLimits {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
        }
    }
}

/// Top-level settings bundle injected into the orchestrator, job runner and
/// watcher at construction time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    pub limits: Limits,
    pub window: WindowLimits,
    pub polling: PollingLimits,
    pub skills: SkillLimits,
}

impl Settings {
    /// Load settings from environment variables (prefixed `HERMES_`), falling
    /// back to [`Settings::default`] for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("HERMES_").split("_"))
            .extract()
            .map_err(ConfigError::Load)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Load(figment::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Load(e) => write!(f, "failed to load settings: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
