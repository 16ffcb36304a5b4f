//! # Dispatcher
//!
//! Authorises every call and hands it to the handlers registered under its
//! key. The authorisation decision is synchronous; handlers do their own
//! async work and answer through a [`Completion`].
//!
//! ## Decision Steps
//!
//! ```text
//! 1. criticalError?            ──yes──→ DISPATCHED (no checks)
//! 2. moduleName present?       ──no───→ REJECTED (warn)
//!    caller quarantined?       ──yes──→ REJECTED (warn)
//! 3. any handler?              ──no───→ REJECTED (warn)
//! 4. public call?              ──yes──→ DISPATCHED
//! 5. skipJWT?                  ──yes──→ auth + eligible + secret ? DISPATCHED : VIOLATION
//! 6. credential present?       ──no───→ VIOLATION
//! 7. decode → derive → verify  ──err──→ VIOLATION
//!    identity matches caller?  ──no───→ VIOLATION
//! 8. DISPATCHED with claims
//! ```
//!
//! Rejected and contained calls never invoke the caller's completion.

use crate::calls::{
    AuthorizedCall, Call, CallEnvelope, CallKey, CallKind, CallPolicy, CriticalErrorSignal,
    DeactivationSignal, AUTH_MODULE, BUS_MODULE,
};
use crate::completion::{CallError, CallResult, Completion};
use crate::containment::{ContainmentAction, Violation, CRITICAL_SEVERITY};
use crate::notifier::Notifier;
use crate::redact::redact_for_log;
use crate::registry::ModuleRegistry;
use parking_lot::RwLock;
use serde_json::json;
use shared_crypto::{CredentialCodec, SecretBytes};
use shared_types::{
    current_timestamp, Claims, ModuleKind, NotificationEvent, NotificationPriority,
    NotificationType,
};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A call handler. Runs synchronously inside `publish`; spawn for I/O.
pub type Handler = Arc<dyn Fn(Arc<AuthorizedCall>, Completion) + Send + Sync>;

/// Handle for removing one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Errors from handler registration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Module '{0}' is quarantined")]
    Quarantined(String),
}

/// Why a call was dropped without containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MalformedPayload,
    Quarantined,
    NoHandler,
}

/// Outcome of [`Dispatcher::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Dispatched { handlers: usize },
    Rejected(RejectReason),
    Contained {
        violation: Violation,
        action: ContainmentAction,
    },
}

impl Dispatch {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Dispatch::Dispatched { .. })
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub rejected: u64,
    pub meltdowns: u64,
    pub suppressed: u64,
    pub deactivations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    rejected: AtomicU64,
    meltdowns: AtomicU64,
    suppressed: AtomicU64,
    deactivations: AtomicU64,
}

struct Registration {
    id: SubscriptionId,
    owner: String,
    handler: Handler,
}

struct DispatcherInner {
    handlers: RwLock<HashMap<CallKey, Vec<Registration>>>,
    codec: Arc<CredentialCodec>,
    modules: Arc<ModuleRegistry>,
    notifier: Arc<Notifier>,
    auth_module_secret: SecretBytes,
    next_id: AtomicU64,
    counters: Counters,
}

/// The authenticated bus. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Build a dispatcher and install its own `deactivateModule` handler.
    pub fn new(
        codec: Arc<CredentialCodec>,
        modules: Arc<ModuleRegistry>,
        notifier: Arc<Notifier>,
        auth_module_secret: impl Into<SecretBytes>,
    ) -> Self {
        modules.register(BUS_MODULE, ModuleKind::Core);

        let inner = Arc::new(DispatcherInner {
            handlers: RwLock::new(HashMap::new()),
            codec,
            modules,
            notifier,
            auth_module_secret: auth_module_secret.into(),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        });
        install_deactivation_handler(&inner);
        Self { inner }
    }

    /// Register `handler` for `key` on behalf of module `owner`.
    ///
    /// Handlers for one key run in registration order. A quarantined module
    /// cannot register.
    pub fn subscribe<F>(
        &self,
        key: impl Into<CallKey>,
        owner: &str,
        handler: F,
    ) -> Result<SubscriptionId, BusError>
    where
        F: Fn(Arc<AuthorizedCall>, Completion) + Send + Sync + 'static,
    {
        let key = key.into();
        if self.inner.modules.is_quarantined(owner) {
            warn!(module = owner, call = %key, "Quarantined module tried to subscribe");
            return Err(BusError::Quarantined(owner.to_string()));
        }
        Ok(self.inner.add_handler(key, owner, Arc::new(handler)))
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let mut found = false;
        handlers.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|registration| registration.id != id);
            found |= registrations.len() != before;
            !registrations.is_empty()
        });
        found
    }

    /// Remove every handler owned by `owner`. Returns how many were removed.
    pub fn unsubscribe_module(&self, owner: &str) -> usize {
        self.inner.remove_owner(owner)
    }

    pub fn has_listeners(&self, key: &CallKey) -> bool {
        self.inner.has_listeners(key)
    }

    pub fn listener_count(&self, key: &CallKey) -> usize {
        self.inner
            .handlers
            .read()
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Authorise and dispatch a call.
    pub fn publish(&self, envelope: CallEnvelope, completion: Completion) -> Dispatch {
        self.inner.publish(envelope, completion)
    }

    /// Publish and wait for the first completion, at most `timeout`.
    ///
    /// A call that is rejected, contained or left unanswered yields
    /// [`CallError::NoReply`].
    pub async fn request(&self, envelope: CallEnvelope, timeout: Duration) -> CallResult {
        let call_id = envelope.call_id;
        let (completion, reply) = Completion::channel();
        self.publish(envelope, completion);

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                debug!(call_id = %call_id, "Call finished without a reply");
                Err(CallError::NoReply)
            }
            Err(_) => {
                debug!(call_id = %call_id, ?timeout, "Call timed out");
                Err(CallError::NoReply)
            }
        }
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.inner.modules
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.inner.notifier
    }

    pub fn stats(&self) -> DispatchStats {
        let counters = &self.inner.counters;
        DispatchStats {
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            meltdowns: counters.meltdowns.load(Ordering::Relaxed),
            suppressed: counters.suppressed.load(Ordering::Relaxed),
            deactivations: counters.deactivations.load(Ordering::Relaxed),
        }
    }
}

fn install_deactivation_handler(inner: &Arc<DispatcherInner>) {
    let weak: Weak<DispatcherInner> = Arc::downgrade(inner);
    let handler: Handler = Arc::new(move |call, completion| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if let Call::DeactivateModule(signal) = call.call() {
            let removed = inner.deactivate(&signal.module_name, &signal.reason);
            completion.ok(json!({
                "moduleName": signal.module_name,
                "removedHandlers": removed,
            }));
        }
    });
    inner.add_handler(CallKind::DeactivateModule.into(), BUS_MODULE, handler);
}

impl DispatcherInner {
    fn add_handler(&self, key: CallKey, owner: &str, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(module = owner, call = %key, "Handler registered");
        self.handlers
            .write()
            .entry(key)
            .or_default()
            .push(Registration {
                id,
                owner: owner.to_string(),
                handler,
            });
        id
    }

    fn remove_owner(&self, owner: &str) -> usize {
        let mut handlers = self.handlers.write();
        let mut removed = 0;
        handlers.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|registration| registration.owner != owner);
            removed += before - registrations.len();
            !registrations.is_empty()
        });
        removed
    }

    fn has_listeners(&self, key: &CallKey) -> bool {
        self.handlers
            .read()
            .get(key)
            .is_some_and(|registrations| !registrations.is_empty())
    }

    fn publish(&self, envelope: CallEnvelope, completion: Completion) -> Dispatch {
        let key = envelope.call.key();
        let policy = key.policy();

        if policy == CallPolicy::Exempt {
            return self.dispatch(&key, envelope, None, completion);
        }

        if envelope.module_name.trim().is_empty() {
            warn!(call = %key, payload = %redact_for_log(&envelope), "Call rejected: no moduleName");
            return self.reject(RejectReason::MalformedPayload);
        }

        if self.modules.is_quarantined(&envelope.module_name) {
            warn!(module = %envelope.module_name, call = %key, "Call rejected: module quarantined");
            return self.reject(RejectReason::Quarantined);
        }

        if !self.has_listeners(&key) {
            warn!(module = %envelope.module_name, call = %key, "Call rejected: no handler");
            return self.reject(RejectReason::NoHandler);
        }

        if policy == CallPolicy::Public {
            return self.dispatch(&key, envelope, None, completion);
        }

        if envelope.skip_jwt {
            if policy == CallPolicy::SkipJwtEligible && self.bootstrap_authorized(&envelope) {
                debug!(call = %key, "Bootstrap call authorised");
                return self.dispatch(&key, envelope, None, completion);
            }
            return self.contain(&key, &envelope, Violation::SkipJwtMisuse);
        }

        let Some(jwt) = envelope.jwt.as_deref() else {
            return self.contain(&key, &envelope, Violation::MissingCredential);
        };

        let claims = match self.codec.verify_embedded(jwt) {
            Ok(claims) => claims,
            Err(e) => return self.contain(&key, &envelope, Violation::InvalidCredential(e)),
        };

        if let Some(violation) = impersonation(&envelope, &claims) {
            return self.contain(&key, &envelope, violation);
        }

        self.dispatch(&key, envelope, Some(claims), completion)
    }

    fn bootstrap_authorized(&self, envelope: &CallEnvelope) -> bool {
        envelope.module_name == AUTH_MODULE
            && envelope
                .auth_module_secret
                .as_deref()
                .is_some_and(|secret| self.auth_module_secret.matches(secret.as_bytes()))
    }

    fn dispatch(
        &self,
        key: &CallKey,
        envelope: CallEnvelope,
        claims: Option<Claims>,
        completion: Completion,
    ) -> Dispatch {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<(String, Handler)> = self
            .handlers
            .read()
            .get(key)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (r.owner.clone(), r.handler.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let call = Arc::new(AuthorizedCall { envelope, claims });
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(
            call = %key,
            module = %call.module_name(),
            call_id = %call.envelope.call_id,
            handlers = handlers.len(),
            "Call dispatched"
        );

        for (owner, handler) in &handlers {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| handler(call.clone(), completion.clone())));
            if outcome.is_err() {
                // Containing here would re-emit the signal into the same handler.
                if key.is_containment_signal() {
                    error!(module = %owner, call = %key, "Containment signal handler panicked");
                    continue;
                }
                error!(module = %owner, call = %key, "Handler panicked");
                self.contain_module(owner, false, key, Violation::HandlerPanic);
            }
        }

        Dispatch::Dispatched {
            handlers: handlers.len(),
        }
    }

    fn reject(&self, reason: RejectReason) -> Dispatch {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        Dispatch::Rejected(reason)
    }

    fn contain(&self, key: &CallKey, envelope: &CallEnvelope, violation: Violation) -> Dispatch {
        warn!(
            module = %envelope.module_name,
            call = %key,
            violation = %violation,
            payload = %redact_for_log(envelope),
            "Authorisation violation"
        );
        let action = self.contain_module(
            &envelope.module_name,
            envelope.externally_validated,
            key,
            violation.clone(),
        );
        Dispatch::Contained { violation, action }
    }

    fn contain_module(
        &self,
        module_name: &str,
        externally_validated: bool,
        key: &CallKey,
        violation: Violation,
    ) -> ContainmentAction {
        match self.modules.kind_of(module_name) {
            ModuleKind::Core if externally_validated => {
                self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    module = module_name,
                    call = %key,
                    error_code = violation.error_code(),
                    "Core violation on externally validated call, meltdown suppressed"
                );
                ContainmentAction::Suppressed
            }
            ModuleKind::Core => {
                self.meltdown(module_name, key, &violation);
                ContainmentAction::Meltdown
            }
            ModuleKind::Community => {
                self.request_deactivation(module_name, key, &violation);
                ContainmentAction::Deactivated
            }
        }
    }

    fn meltdown(&self, module_name: &str, key: &CallKey, violation: &Violation) {
        self.counters.meltdowns.fetch_add(1, Ordering::Relaxed);
        let error_code = violation.error_code();
        let message = format!("Core module '{module_name}' failed authorisation on '{key}': {violation}");
        let timestamp = current_timestamp();

        error!(
            severity = CRITICAL_SEVERITY,
            module = module_name,
            error_code,
            call = %key,
            "{message}"
        );

        self.notifier.publish(NotificationEvent {
            module_name: module_name.to_string(),
            notification_type: NotificationType::System,
            priority: NotificationPriority::Critical,
            message: message.clone(),
            timestamp,
        });

        let signal = CriticalErrorSignal {
            module_name: module_name.to_string(),
            error_code: error_code.to_string(),
            message,
            severity: CRITICAL_SEVERITY.to_string(),
            timestamp,
        };
        self.publish(
            CallEnvelope::new(BUS_MODULE, Call::CriticalError(signal)),
            Completion::noop(),
        );
    }

    fn request_deactivation(&self, module_name: &str, key: &CallKey, violation: &Violation) {
        let reason = format!("Unauthorized call to '{key}': {violation}");
        warn!(module = module_name, reason = %reason, "Deactivating module");

        let signal = DeactivationSignal {
            module_name: module_name.to_string(),
            reason,
        };
        self.publish(
            CallEnvelope::new(BUS_MODULE, Call::DeactivateModule(signal)),
            Completion::noop(),
        );
    }

    /// Handler side of `deactivateModule`. Core modules, the bus included,
    /// are never deactivated; their violations melt down instead.
    fn deactivate(&self, module_name: &str, reason: &str) -> usize {
        if self.modules.kind_of(module_name) == ModuleKind::Core {
            warn!(module = module_name, reason, "Refusing to deactivate a core module");
            return 0;
        }
        if self.modules.quarantine(module_name) {
            self.counters.deactivations.fetch_add(1, Ordering::Relaxed);
        }
        let removed = self.remove_owner(module_name);
        info!(module = module_name, removed, reason, "Module deactivated");
        removed
    }
}

/// A module credential must name the calling module, and only the
/// bootstrap path may mint credentials for another module.
fn impersonation(envelope: &CallEnvelope, claims: &Claims) -> Option<Violation> {
    if claims.is_module() {
        let holder = claims.module_name.as_deref().unwrap_or(claims.sub.as_str());
        if holder != envelope.module_name {
            return Some(Violation::Impersonation {
                impersonated: holder.to_string(),
            });
        }
    }

    if let Call::IssueModuleToken(request) = &envelope.call {
        let target = request
            .sign_as_module
            .as_deref()
            .unwrap_or(request.module_name.as_str());
        if target != envelope.module_name {
            return Some(Violation::Impersonation {
                impersonated: target.to_string(),
            });
        }
    }

    None
}
