//! # Service Container
//!
//! Builds the shared context once at startup and hands out references.
//! There are no process-wide singletons; everything the dispatcher and the
//! token service share lives here.
//!
//! ## Construction Order
//!
//! 1. Trust-tier policy from the tier config
//! 2. Credential codec over the base secret and the policy
//! 3. Module registry, seeded from the module config
//! 4. Revocation index and notification side-channel
//! 5. Dispatcher (registers itself as `bus`)
//! 6. Token service over the injected directory and refresh store

use crate::config::RuntimeConfig;
use cms_telemetry::CmsMetrics;
use shared_bus::{Call, CallEnvelope, Dispatcher, ModuleRegistry, Notifier, AUTH_MODULE};
use shared_crypto::{CredentialCodec, TrustTierPolicy};
use shared_types::ModuleKind;
use std::sync::Arc;
use token_service::{RefreshTokenStore, RevocationIndex, TokenService, UserDirectory};
use tracing::info;

/// Token service over type-erased collaborators.
pub type SharedTokenService =
    Arc<TokenService<Arc<dyn UserDirectory>, Arc<dyn RefreshTokenStore>>>;

/// Everything the runtime shares between the bus and its handlers.
pub struct ServiceContainer {
    pub config: RuntimeConfig,
    pub policy: Arc<TrustTierPolicy>,
    pub codec: Arc<CredentialCodec>,
    pub modules: Arc<ModuleRegistry>,
    pub revocations: Arc<RevocationIndex>,
    pub notifier: Arc<Notifier>,
    pub bus: Dispatcher,
    pub tokens: SharedTokenService,
    pub metrics: CmsMetrics,
}

impl ServiceContainer {
    /// Wire the context. `config` is assumed to have passed
    /// [`RuntimeConfig::validate`].
    pub fn new(
        config: RuntimeConfig,
        directory: Arc<dyn UserDirectory>,
        refresh_store: Arc<dyn RefreshTokenStore>,
        metrics: CmsMetrics,
    ) -> Self {
        let policy = Arc::new(config.tiers.to_policy());
        let codec = Arc::new(CredentialCodec::new(
            config.secrets.jwt_secret.clone(),
            Arc::clone(&policy),
        ));

        let modules = Arc::new(ModuleRegistry::new());
        for name in &config.modules.core {
            modules.register(name.as_str(), ModuleKind::Core);
        }
        for name in &config.modules.community {
            modules.register(name.as_str(), ModuleKind::Community);
        }

        let revocations = Arc::new(RevocationIndex::new());
        let notifier = Arc::new(Notifier::new(config.secrets.notification_secret.clone()));
        let bus = Dispatcher::new(
            Arc::clone(&codec),
            Arc::clone(&modules),
            Arc::clone(&notifier),
            config.secrets.auth_module_secret.clone(),
        );

        let tokens = Arc::new(TokenService::new(
            Arc::clone(&codec),
            Arc::clone(&revocations),
            directory,
            refresh_store,
            (&config.tokens).into(),
        ));

        info!(
            core = config.modules.core.len(),
            community = config.modules.community.len(),
            "Service container initialized"
        );

        Self {
            config,
            policy,
            codec,
            modules,
            revocations,
            notifier,
            bus,
            tokens,
            metrics,
        }
    }

    /// Envelope for a call the `auth` module makes on the skip-JWT path.
    pub fn bootstrap_envelope(&self, call: Call) -> CallEnvelope {
        let secret = String::from_utf8_lossy(self.config.secrets.auth_module_secret.as_bytes());
        CallEnvelope::new(AUTH_MODULE, call).skip_jwt(secret.into_owned())
    }
}
