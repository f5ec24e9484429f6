//! # Bus Telemetry
//!
//! Logging and metrics for the layered event bus.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, JSON or pretty output
//! - **Metrics**: Prometheus counters and histograms for every bus layer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bus_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EB_SERVICE_NAME` | `layered-bus` | Service name in logs |
//! | `EB_LOG_LEVEL` | `info` | Log level filter |
//! | `EB_JSON_LOGS` | `false` | JSON log lines |
//! | `EB_METRICS_ENABLED` | `true` | Register Prometheus metrics |

pub mod metrics;

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, time_handler, MetricsHandle, DUPLICATES_REJECTED, EVENTS_EMITTED,
    FANOUT_DELIVERED, FANOUT_OVERFLOW, HANDLER_DURATION, HANDLER_FAILURES, REPLAY_EVICTIONS,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and (optionally) metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };

    let tracing_guard = init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
#[derive(Debug)]
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    metrics: Option<MetricsHandle>,
}

impl TelemetryGuard {
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
