//! # CMS Runtime
//!
//! Wires the credential codec, the token service, the authenticated bus and
//! the notification side-channel into one process.
//!
//! ## Modular Structure
//!
//! - `config` - environment configuration and boot validation
//! - `container` - the shared context, built once
//! - `handlers` - bus handlers for the `auth` module and the bus itself
//! - `adapters` - in-memory user directory and refresh store, notification sinks
//!
//! ## Startup Sequence
//!
//! 1. Load and validate configuration (fatal on error)
//! 2. Initialize logging and metrics
//! 3. Build the service container and register handlers
//! 4. Attach notification sinks and start the metrics sync task
//! 5. Mint module credentials through the `auth` bootstrap path
//! 6. Run until shutdown

pub mod adapters;
pub mod config;
pub mod container;
pub mod handlers;

pub use config::{ConfigError, RuntimeConfig};
pub use container::{ServiceContainer, SharedTokenService};

use adapters::{LogNotificationSink, MetricsNotificationSink};
use handlers::{register_auth_handlers, register_system_handlers, spawn_metrics_sync, AuthContext};
use shared_bus::{
    BusError, Call, CallError, IssueModuleTokenRequest, NotificationFilter, DEFAULT_REQUEST_TIMEOUT,
};
use shared_types::{ModuleKind, TrustTier};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often dispatcher counters are mirrored into Prometheus.
pub const METRICS_SYNC_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Handler registration failed: {0}")]
    Registration(#[from] BusError),

    #[error("Bootstrap credential for '{module}' failed: {source}")]
    Bootstrap {
        module: String,
        #[source]
        source: CallError,
    },
}

/// The running CMS core.
pub struct CmsRuntime {
    container: Arc<ServiceContainer>,
    sinks: Vec<JoinHandle<()>>,
    metrics_sync: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl CmsRuntime {
    /// Build the container and subscribe every runtime handler.
    pub fn new(container: ServiceContainer) -> Result<Self, RuntimeError> {
        let container = Arc::new(container);
        register_system_handlers(&container.bus)?;
        register_auth_handlers(&container.bus, AuthContext::from_container(&container))?;

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            container,
            sinks: Vec::new(),
            metrics_sync: None,
            shutdown_tx,
        })
    }

    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// Attach the notification sinks and start background tasks.
    pub fn start(&mut self) {
        let notifier = &self.container.notifier;
        self.sinks
            .push(notifier.spawn_sink(Arc::new(LogNotificationSink), NotificationFilter::all()));
        self.sinks.push(notifier.spawn_sink(
            Arc::new(MetricsNotificationSink::new(
                self.container.metrics.notifications.clone(),
            )),
            NotificationFilter::all(),
        ));
        self.metrics_sync = Some(spawn_metrics_sync(
            self.container.bus.clone(),
            self.container.metrics.clone(),
            METRICS_SYNC_INTERVAL,
            self.shutdown_tx.subscribe(),
        ));
        info!(sinks = self.sinks.len(), "Runtime started");
    }

    /// Mint a credential for every configured module through the `auth`
    /// skip-JWT path. Core modules get `High`, community modules `Low`,
    /// unless an override pins them elsewhere.
    pub async fn bootstrap_modules(&self) -> Result<BTreeMap<String, String>, RuntimeError> {
        let mut credentials = BTreeMap::new();
        for (module, kind) in self.container.modules.registered() {
            if module == shared_bus::BUS_MODULE {
                continue;
            }
            let tier = match kind {
                ModuleKind::Core => TrustTier::High,
                ModuleKind::Community => TrustTier::Low,
            };
            let token = self.mint_module_credential(&module, tier).await?;
            credentials.insert(module, token);
        }
        info!(modules = credentials.len(), "Module credentials issued");
        Ok(credentials)
    }

    async fn mint_module_credential(
        &self,
        module: &str,
        tier: TrustTier,
    ) -> Result<String, RuntimeError> {
        let envelope = self
            .container
            .bootstrap_envelope(Call::IssueModuleToken(IssueModuleTokenRequest {
                module_name: shared_bus::AUTH_MODULE.to_string(),
                trust_tier: tier,
                sign_as_module: Some(module.to_string()),
            }));
        let failed = |source| RuntimeError::Bootstrap {
            module: module.to_string(),
            source,
        };

        let reply = self
            .container
            .bus
            .request(envelope, DEFAULT_REQUEST_TIMEOUT)
            .await
            .map_err(failed)?;
        reply["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| failed(CallError::InvalidPayload("reply carries no token".into())))
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.metrics_sync {
            if let Err(e) = task.await {
                warn!(error = %e, "Metrics sync task failed");
            }
        }
        // Sinks only end when the notifier closes, which outlives us.
        for sink in self.sinks {
            sink.abort();
            if let Err(e) = sink.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Notification sink failed");
                }
            }
        }
        info!("Runtime stopped");
    }
}
