//! Observability module for logging and metrics

pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use metrics::{GuardMetrics, GuardSnapshot};

/// Initialize logging and tracing.
///
/// `RUST_LOG` takes precedence over `log_level`. Formats: `json`, `compact`
/// and `pretty`; anything else is the default human-readable output.
pub fn init_observability(log_level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(false))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}
