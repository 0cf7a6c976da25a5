//! Tracing setup shared by every long-running piece of the core (orchestrator
//! loop, scheduled-job runner, background watcher).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install a reasonable default `tracing` subscriber: span-close timing on
/// stderr, filtered by `RUST_LOG` (falling back to `hermes_core=info`).
pub fn init_default_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE);

    Registry::default().with(filter).with(fmt_layer).init();
}
