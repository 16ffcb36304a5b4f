//! # CMS Telemetry
//!
//! Logging and metrics for the CMS core.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cms_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let guard = init_telemetry(TelemetryConfig::from_env())?;
//! guard.metrics().tokens_issued.with_label_values(&["module"]).inc();
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CMS_SERVICE_NAME` | `cms-core` | Service name in the startup log |
//! | `CMS_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `CMS_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CMS_JSON_LOGS` | `true` in containers | JSON log lines |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{encode_metrics, sync_counter, CmsMetrics, REGISTRY};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    Metrics(String),
}

/// Install logging and register metrics on the global registry.
///
/// Call once per process; a second call fails because both the subscriber
/// and the metric names are already taken.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = CmsMetrics::register(&REGISTRY)?;
    init_logging(&config)?;
    Ok(TelemetryGuard { metrics })
}

/// Keeps telemetry handles alive for the life of the process.
pub struct TelemetryGuard {
    metrics: CmsMetrics,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> &CmsMetrics {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}

/// Increment a counter, optionally selecting label values first.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
