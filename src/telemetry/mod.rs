//! Logging setup for taskq.
//!
//! Two output formats:
//! - Human-readable (default)
//! - JSON, enabled via TASKQ_LOG_FORMAT=json, for log aggregation

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    /// `Json` if TASKQ_LOG_FORMAT is "json" (any case), otherwise `Human`.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("TASKQ_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Human
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Environment Variables
///
/// - `TASKQ_LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `TASKQ_LOG_LEVEL` or `RUST_LOG`: filter such as `info` or `taskq=debug`
///   (default `info`)
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_env("TASKQ_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match LogFormat::from_env() {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_span_events(FmtSpan::CLOSE)
                        .with_current_span(true)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .try_init()
        }
        LogFormat::Human => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_span_events(FmtSpan::CLOSE)
                        .with_target(true)
                        .with_thread_ids(false),
                )
                .try_init()
        }
    }
}
