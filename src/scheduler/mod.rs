//! Scheduled-Job Runner (`spec.md` §4.11): polls for due jobs, invokes the
//! tool-execution surface with a restricted prompt, and advances each job's
//! `next_run_at`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::agents::AgentRegistry;
use crate::context::{Channel, ExecutionContext};
use crate::llm::LlmChatClient;
use crate::poller::IntervalPoller;
use crate::skills::SkillRegistry;
use crate::stores::{JobPatch, JobStore, OutboundSender};
use crate::tools::{ToolExecutionSurface, ToolRegistry};

const ONCE_PREFIX: &str = "@once@";

/// A single scheduled job (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub phone_number: String,
    pub user_request: Option<String>,
    pub prompt: String,
    /// Either a standard five-field cron expression, or the one-shot form
    /// `@once@{RFC3339 timestamp}` (`spec.md` §4.11).
    pub cron_expression: String,
    pub timezone: String,
    pub next_run_at: i64,
    pub last_run_at: Option<i64>,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduledJob {
    fn is_one_shot(&self) -> bool {
        self.cron_expression.starts_with(ONCE_PREFIX)
    }
}

#[derive(Debug)]
pub enum SchedulerError {
    InvalidCron(String),
    InvalidTimezone(String),
    NoUpcomingFireTime,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::InvalidCron(e) => write!(f, "invalid cron expression: {e}"),
            SchedulerError::InvalidTimezone(e) => write!(f, "invalid timezone: {e}"),
            SchedulerError::NoUpcomingFireTime => write!(f, "cron schedule has no upcoming fire time"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Computes the next `next_run_at` (unix seconds) after `after`, in the
/// job's IANA timezone. DST behavior is whatever the `cron` crate's
/// `after()` iterator does natively (`SPEC_FULL.md` §4.11 open question
/// resolution: no custom DST handling layered on top).
pub fn advance_job(job: &ScheduledJob, after: DateTime<Utc>) -> Result<Option<i64>, SchedulerError> {
    if job.is_one_shot() {
        return Ok(None);
    }

    let tz: Tz = job.timezone.parse().map_err(|_| SchedulerError::InvalidTimezone(job.timezone.clone()))?;
    let schedule = Schedule::from_str(&normalize_cron(&job.cron_expression)).map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;
    let local_after = after.with_timezone(&tz);
    let next = schedule.after(&local_after).next().ok_or(SchedulerError::NoUpcomingFireTime)?;
    Ok(Some(next.with_timezone(&Utc).timestamp()))
}

/// The `cron` crate requires a leading seconds field (6 or 7 fields); `spec.md`
/// §3/§4.11 specifies standard five-field expressions (`minute hour day month
/// weekday`). Prepends a `0` seconds field so a literal five-field string like
/// `"0 9 * * *"` is accepted; six- or seven-field expressions pass through
/// unchanged.
fn normalize_cron(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Runs due jobs against the tool-execution surface and sends their output
/// via the injected [`OutboundSender`] (`spec.md` §4.11).
pub struct JobRunner<'a> {
    pub jobs: &'a (dyn JobStore + 'a),
    pub outbound: &'a (dyn OutboundSender + 'a),
    pub llm: &'a dyn LlmChatClient,
    pub tools: &'a ToolRegistry,
    pub agents: &'a AgentRegistry,
    pub skills: &'a SkillRegistry,
    pub max_tool_iterations: usize,
    pub restricted_tools: Vec<String>,
}

impl<'a> JobRunner<'a> {
    /// Wraps this runner in an [`IntervalPoller`] ticking every
    /// `interval_ms` (`spec.md` §4.11 relies on `spec.md` §4.10 for cadence).
    pub fn into_poller(self: Arc<Self>, interval_ms: u64) -> IntervalPoller
    where
        Self: 'static,
    {
        let runner = self;
        IntervalPoller::new(Duration::from_millis(interval_ms), move || {
            let runner = runner.clone();
            async move { runner.run_due_jobs().await }
        })
    }

    /// Queries due jobs ascending by `next_run_at`, runs each one, and
    /// advances (or disables) it. Per-job failures are logged and never
    /// abort the rest of the batch (`spec.md` §4.11).
    #[instrument(level = "debug", skip(self))]
    pub async fn run_due_jobs(&self) {
        let now = Utc::now();
        let due = match self.jobs.get_due_jobs(now.timestamp()).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to query due jobs");
                return;
            }
        };

        for job in due {
            if let Err(e) = self.run_one(&job, now).await {
                error!(job_id = %job.id, error = %e, "scheduled job run failed");
            }
        }
    }

    async fn run_one(&self, job: &ScheduledJob, now: DateTime<Utc>) -> Result<(), Box<dyn std::error::Error>> {
        info!(job_id = %job.id, phone = %job.phone_number, "running scheduled job");

        let system_prompt = format!(
            "You are executing a scheduled task on behalf of a user. \
            Produce a concise message suitable for direct delivery; do not ask clarifying questions.\n\n\
            Original request: {}",
            job.user_request.as_deref().unwrap_or("(none)"),
        );

        let surface = ToolExecutionSurface::new(self.llm, self.tools, self.max_tool_iterations);
        let ctx = ExecutionContext::new(job.phone_number.clone(), Channel::Scheduler, now);
        let result = surface.execute(&system_prompt, &job.prompt, &self.restricted_tools, &ctx, &[]).await;

        if let Some(text) = result.output().and_then(|v| v.as_str()) {
            self.outbound.send(&job.phone_number, Channel::Sms, text).await?;
        } else if let Some(error) = result.error_message() {
            warn!(job_id = %job.id, error, "scheduled job produced no output");
        }

        let patch = match advance_job(job, now) {
            Ok(Some(next_run_at)) => JobPatch {
                next_run_at: Some(next_run_at),
                last_run_at: Some(now.timestamp()),
                enabled: None,
            },
            Ok(None) => JobPatch {
                next_run_at: None,
                last_run_at: Some(now.timestamp()),
                enabled: Some(false),
            },
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "failed to compute next fire time, disabling job");
                JobPatch {
                    next_run_at: None,
                    last_run_at: Some(now.timestamp()),
                    enabled: Some(false),
                }
            }
        };
        self.jobs.update_job(&job.id, patch).await?;
        Ok(())
    }
}
