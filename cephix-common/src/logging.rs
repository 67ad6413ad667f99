//! # Cephix Logging
//!
//! Structured logging for the CSI driver daemon.
//!
//! ## Features
//! - Console output with targets and thread IDs for debugging
//! - JSON output for log aggregation (ELK, Loki)
//! - `RUST_LOG`-style filtering via `EnvFilter`

use anyhow::Result;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging with human-readable console output.
///
/// The level argument is used as the default filter when `RUST_LOG` is not
/// set; `RUST_LOG` always wins so operators can raise verbosity per module
/// (`RUST_LOG=cephix_core::journal=trace`).
///
/// # Example
/// ```
/// cephix_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(true)
                .with_target(true)
                .with_thread_ids(true),
        );

    subscriber.init();

    Ok(())
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
///
/// Outputs structured JSON logs that can be parsed by tools like:
/// - Elasticsearch/Logstash/Kibana (ELK)
/// - Grafana Loki
pub fn init_logging_json(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true),
        );

    subscriber.init();

    Ok(())
}
