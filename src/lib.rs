//! Orchestration core for a conversational task assistant.
//!
//! This crate implements the planner/executor/replanner loop that turns one
//! inbound message into a bounded sequence of agent/skill invocations
//! (`orchestrator`), plus the two background subsystems that share its
//! execution path: a cron-like scheduled-job runner (`scheduler`) and a
//! skill-matching background watcher (`watcher`). HTTP intake, persistent
//! stores, and concrete provider integrations are external collaborators
//! reached only through the traits in `stores` and `llm`.
//!
//! ```no_run
//! use hermes_core::{init_default_tracing, config::Settings};
//!
//! init_default_tracing();
//! let settings = Settings::from_env().unwrap_or_default();
//! ```

#![forbid(unsafe_code)]

pub mod agents;
pub mod composer;
pub mod config;
pub mod context;
pub mod conversation;
pub mod executor;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod poller;
pub mod replanner;
pub mod scheduler;
pub mod skills;
pub mod stores;
pub mod tools;
pub mod watcher;

pub use context::{Channel, ExecutionContext, StepResult, UserProfile};
pub use observability::init_default_tracing;
pub use orchestrator::{HandledRequest, OrchestratorCore};
pub use plan::{ExecutionPlan, PlanContext, PlanError, PlanStep, PlanStatus, StepStatus, TargetType};
pub use scheduler::{JobRunner, ScheduledJob};
pub use watcher::{DomainItem, DomainSync, Watcher};
