//! # System Handlers
//!
//! Calls owned by the bus itself, plus the task that mirrors dispatcher
//! counters into Prometheus.

use cms_telemetry::{sync_counter, CmsMetrics};
use serde_json::json;
use shared_bus::{
    BusError, Call, CallError, CallKind, Dispatcher, NotifyOutcome, SubscriptionId, BUS_MODULE,
};
use shared_types::current_timestamp;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Subscribe `heartbeat` and `notify` under the bus's own name, which
/// cannot be deactivated.
pub fn register_system_handlers(bus: &Dispatcher) -> Result<Vec<SubscriptionId>, BusError> {
    let heartbeat_bus = bus.clone();
    let heartbeat = bus.subscribe(CallKind::Heartbeat, BUS_MODULE, move |_, completion| {
        let stats = heartbeat_bus.stats();
        completion.ok(json!({
            "status": "ok",
            "timestamp": current_timestamp(),
            "dispatched": stats.dispatched,
            "quarantined": heartbeat_bus.modules().quarantined(),
        }));
    })?;

    let notifier = bus.notifier().clone();
    let notify = bus.subscribe(CallKind::Notify, BUS_MODULE, move |call, completion| {
        let Call::Notify(request) = call.call() else {
            completion.fail(CallError::InvalidPayload("expected a notification".into()));
            return;
        };
        // A dropped notification is not an error for the sender.
        match notifier.notify(request.clone()) {
            NotifyOutcome::Delivered { event, receivers } => completion.ok(json!({
                "delivered": true,
                "receivers": receivers,
                "timestamp": event.timestamp,
            })),
            NotifyOutcome::Dropped(_) => completion.ok(json!({ "delivered": false })),
        };
    })?;

    info!("System handlers registered");
    Ok(vec![heartbeat, notify])
}

/// Mirror the dispatcher's counters into the Prometheus counters.
pub fn sync_metrics(bus: &Dispatcher, metrics: &CmsMetrics) {
    let stats = bus.stats();
    for (outcome, total) in [
        ("dispatched", stats.dispatched),
        ("rejected", stats.rejected),
    ] {
        sync_counter(&metrics.bus_calls.with_label_values(&[outcome]), total);
    }
    for (action, total) in [
        ("meltdown", stats.meltdowns),
        ("suppressed", stats.suppressed),
        ("deactivated", stats.deactivations),
    ] {
        sync_counter(&metrics.containment.with_label_values(&[action]), total);
    }
}

/// Run [`sync_metrics`] every `interval` until `shutdown` flips to `true`.
pub fn spawn_metrics_sync(
    bus: Dispatcher,
    metrics: CmsMetrics,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => sync_metrics(&bus, &metrics),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        sync_metrics(&bus, &metrics);
        debug!("Metrics sync stopped");
    })
}
