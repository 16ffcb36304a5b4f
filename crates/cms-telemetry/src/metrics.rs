//! Prometheus metrics for the CMS bus.
//!
//! All metrics follow the naming convention: `cms_<area>_<metric>_total`
//!
//! | Metric | Labels |
//! |--------|--------|
//! | `cms_bus_calls_total` | `outcome`: dispatched, rejected |
//! | `cms_bus_containment_total` | `action`: meltdown, suppressed, deactivated |
//! | `cms_tokens_issued_total` | `kind`: module, user, public, refresh |
//! | `cms_notifications_total` | `type`: security, system, user |

use crate::TelemetryError;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Process-wide registry the binary exports.
    pub static ref REGISTRY: Registry = Registry::new();
}

/// Handles to every CMS metric. Cheap to clone.
#[derive(Clone)]
pub struct CmsMetrics {
    pub bus_calls: IntCounterVec,
    pub containment: IntCounterVec,
    pub tokens_issued: IntCounterVec,
    pub notifications: IntCounterVec,
}

impl CmsMetrics {
    /// Create all metrics and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self {
            bus_calls: counter_vec(
                "cms_bus_calls_total",
                "Calls seen by the dispatcher by outcome",
                &["outcome"],
            )?,
            containment: counter_vec(
                "cms_bus_containment_total",
                "Containment actions taken against modules",
                &["action"],
            )?,
            tokens_issued: counter_vec(
                "cms_tokens_issued_total",
                "Credentials issued by kind",
                &["kind"],
            )?,
            notifications: counter_vec(
                "cms_notifications_total",
                "Notifications delivered by type",
                &["type"],
            )?,
        };

        for collector in [
            &metrics.bus_calls,
            &metrics.containment,
            &metrics.tokens_issued,
            &metrics.notifications,
        ] {
            registry
                .register(Box::new(collector.clone()))
                .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        }
        Ok(metrics)
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec, TelemetryError> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}

/// Raise `counter` to `total` if it lags behind.
///
/// For mirroring a monotonic count kept elsewhere into a Prometheus counter.
pub fn sync_counter(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

/// Encode all metrics in `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
