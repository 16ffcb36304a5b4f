//! # Notification Sinks
//!
//! Consumers attached to the notification side-channel with
//! `Notifier::spawn_sink`.

use async_trait::async_trait;
use cms_telemetry::metric_inc;
use prometheus::IntCounterVec;
use shared_bus::NotificationSink;
use shared_types::{NotificationEvent, NotificationPriority};
use tracing::{error, info, warn};

/// Writes every notification to the log, at a level matching its priority.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: NotificationEvent) {
        match event.priority {
            NotificationPriority::Critical => error!(
                severity = "critical",
                module = %event.module_name,
                kind = %event.notification_type,
                timestamp = event.timestamp,
                "{}",
                event.message
            ),
            NotificationPriority::High => warn!(
                module = %event.module_name,
                kind = %event.notification_type,
                timestamp = event.timestamp,
                "{}",
                event.message
            ),
            NotificationPriority::Normal | NotificationPriority::Low => info!(
                module = %event.module_name,
                kind = %event.notification_type,
                timestamp = event.timestamp,
                "{}",
                event.message
            ),
        }
    }
}

/// Counts notifications by type.
#[derive(Clone)]
pub struct MetricsNotificationSink {
    counter: IntCounterVec,
}

impl MetricsNotificationSink {
    pub fn new(counter: IntCounterVec) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl NotificationSink for MetricsNotificationSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn deliver(&self, event: NotificationEvent) {
        metric_inc!(self.counter, &[event.notification_type.as_str()]);
    }
}
