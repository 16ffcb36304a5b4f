//! Containment routing through the public bus API.

use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_bus::{
    Call, CallEnvelope, CallError, CallKey, CallKind, Completion, ContainmentAction,
    CriticalErrorSignal, DeactivationSignal, Dispatch, Dispatcher, ModuleRegistry,
    NotificationFilter, Notifier, Violation, AUTH_MODULE, CORE_JWT_ERROR,
};
use shared_crypto::{CredentialCodec, TierSettings, TrustTierPolicy};
use shared_types::{
    Claims, ModuleKind, NotificationPriority, NotificationType, SubjectKind, TrustTier,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const AUTH_SECRET: &str = "containment-auth-secret-0123456789ab";

struct Harness {
    bus: Dispatcher,
    codec: Arc<CredentialCodec>,
    notifier: Arc<Notifier>,
    critical: Arc<Mutex<Vec<CriticalErrorSignal>>>,
    deactivations: Arc<Mutex<Vec<DeactivationSignal>>>,
}

fn harness() -> Harness {
    let policy = Arc::new(TrustTierPolicy::new(
        TierSettings::new("salt-h", TrustTierPolicy::DEFAULT_HIGH_EXPIRY),
        TierSettings::new("salt-m", TrustTierPolicy::DEFAULT_MEDIUM_EXPIRY),
        TierSettings::new("salt-l", TrustTierPolicy::DEFAULT_LOW_EXPIRY),
    ));
    let codec = Arc::new(CredentialCodec::new(
        "containment-base-secret-0123456789abcdef",
        policy,
    ));
    let notifier = Arc::new(Notifier::new("containment-notify-secret-0123456789"));
    let bus = Dispatcher::new(
        codec.clone(),
        Arc::new(ModuleRegistry::new()),
        notifier.clone(),
        AUTH_SECRET,
    );

    let critical = Arc::new(Mutex::new(Vec::new()));
    let sink = critical.clone();
    bus.subscribe(CallKind::CriticalError, "monitor", move |call, _| {
        if let Call::CriticalError(signal) = call.call() {
            sink.lock().push(signal.clone());
        }
    })
    .unwrap();

    let deactivations = Arc::new(Mutex::new(Vec::new()));
    let sink = deactivations.clone();
    bus.subscribe(CallKind::DeactivateModule, "monitor", move |call, _| {
        if let Call::DeactivateModule(signal) = call.call() {
            sink.lock().push(signal.clone());
        }
    })
    .unwrap();

    Harness {
        bus,
        codec,
        notifier,
        critical,
        deactivations,
    }
}

fn counter(bus: &Dispatcher, event: &str, owner: &str) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = hits.clone();
    bus.subscribe(event, owner, move |_, completion| {
        seen.fetch_add(1, Ordering::SeqCst);
        completion.ok(Value::Null);
    })
    .unwrap();
    hits
}

fn module_token(codec: &CredentialCodec, module: &str, tier: TrustTier) -> String {
    let mut claims = Claims::new(SubjectKind::Module, module);
    claims.module_name = Some(module.to_string());
    codec.sign_default(claims, tier).unwrap().token
}

#[test]
fn test_core_module_without_credential_melts_down() {
    let h = harness();
    h.bus.modules().register("pagesManager", ModuleKind::Core);
    let handled = counter(&h.bus, "getAllPages", "pagesManager");
    let mut alerts = h.notifier.subscribe(NotificationFilter::all());

    let completed = Arc::new(AtomicUsize::new(0));
    let seen = completed.clone();
    let outcome = h.bus.publish(
        CallEnvelope::new("pagesManager", Call::module_event("getAllPages", Value::Null)),
        Completion::from_fn(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );

    assert_eq!(
        outcome,
        Dispatch::Contained {
            violation: Violation::MissingCredential,
            action: ContainmentAction::Meltdown
        }
    );
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    let critical = h.critical.lock();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].module_name, "pagesManager");
    assert_eq!(critical[0].error_code, CORE_JWT_ERROR);
    assert_eq!(critical[0].severity, "critical");
    assert!(h.deactivations.lock().is_empty());

    let alert = alerts.try_recv().unwrap().unwrap();
    assert_eq!(alert.notification_type, NotificationType::System);
    assert_eq!(alert.priority, NotificationPriority::Critical);

    // Meltdown is a signal, not a quarantine.
    assert!(!h.bus.modules().is_quarantined("pagesManager"));
    assert_eq!(h.bus.stats().meltdowns, 1);
}

#[test]
fn test_community_module_is_deactivated() {
    let h = harness();
    h.bus.modules().register("demoPlugin", ModuleKind::Community);
    let owned = counter(&h.bus, "demoAction", "demoPlugin");
    let also_owned = counter(&h.bus, "demoReport", "demoPlugin");
    let other = counter(&h.bus, "getAllPages", "pagesManager");

    let outcome = h.bus.publish(
        CallEnvelope::new("demoPlugin", Call::module_event("demoAction", Value::Null)),
        Completion::noop(),
    );
    assert_eq!(
        outcome,
        Dispatch::Contained {
            violation: Violation::MissingCredential,
            action: ContainmentAction::Deactivated
        }
    );
    assert_eq!(owned.load(Ordering::SeqCst), 0);

    {
        let deactivations = h.deactivations.lock();
        assert_eq!(deactivations.len(), 1);
        assert_eq!(deactivations[0].module_name, "demoPlugin");
        assert!(deactivations[0].reason.contains("demoAction"));
    }
    assert!(h.critical.lock().is_empty());
    assert!(h.bus.modules().is_quarantined("demoPlugin"));

    // Every event demoPlugin owned is now unreachable, even with a valid
    // credential from another module.
    let token = module_token(&h.codec, "pagesManager", TrustTier::High);
    for event in ["demoAction", "demoReport"] {
        let outcome = h.bus.publish(
            CallEnvelope::new("pagesManager", Call::module_event(event, Value::Null))
                .with_jwt(token.clone()),
            Completion::noop(),
        );
        assert!(!outcome.is_dispatched());
    }
    assert_eq!(owned.load(Ordering::SeqCst), 0);
    assert_eq!(also_owned.load(Ordering::SeqCst), 0);

    // Unrelated modules keep working.
    h.bus.publish(
        CallEnvelope::new("pagesManager", Call::module_event("getAllPages", Value::Null))
            .with_jwt(token),
        Completion::noop(),
    );
    assert_eq!(other.load(Ordering::SeqCst), 1);

    // And the quarantined module cannot come back this process.
    assert!(h.bus.subscribe("demoAction", "demoPlugin", |_, _| {}).is_err());
}

#[test]
fn test_unregistered_module_is_treated_as_community() {
    let h = harness();
    counter(&h.bus, "getAllPages", "pagesManager");

    h.bus.publish(
        CallEnvelope::new("strangerPlugin", Call::module_event("getAllPages", Value::Null)),
        Completion::noop(),
    );
    assert_eq!(h.deactivations.lock().len(), 1);
    assert!(h.critical.lock().is_empty());
}

#[test]
fn test_skip_jwt_from_non_auth_module_is_a_violation() {
    let h = harness();
    let issued = Arc::new(AtomicUsize::new(0));
    let seen = issued.clone();
    h.bus
        .subscribe(CallKind::IssueModuleToken, AUTH_MODULE, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let outcome = h.bus.publish(
        CallEnvelope::new(
            "payments",
            Call::IssueModuleToken(shared_bus::IssueModuleTokenRequest {
                module_name: "payments".into(),
                trust_tier: TrustTier::High,
                sign_as_module: None,
            }),
        )
        .skip_jwt(AUTH_SECRET),
        Completion::noop(),
    );

    assert_eq!(
        outcome,
        Dispatch::Contained {
            violation: Violation::SkipJwtMisuse,
            action: ContainmentAction::Deactivated
        }
    );
    assert_eq!(issued.load(Ordering::SeqCst), 0);
    assert_eq!(h.deactivations.lock()[0].module_name, "payments");
}

#[test]
fn test_credential_from_wrong_tier_secret_is_a_violation() {
    let h = harness();
    h.bus.modules().register("pagesManager", ModuleKind::Core);
    let handled = counter(&h.bus, "getAllPages", "themeManager");

    // Claims High but signed under the Low secret.
    let mut claims = Claims::new(SubjectKind::Module, "pagesManager");
    claims.module_name = Some("pagesManager".into());
    claims.trust_tier = TrustTier::High;
    claims.jti = "forged".into();
    claims.exp = shared_types::current_timestamp() + 60;
    let forged =
        shared_crypto::encode_with_secret(&claims, &h.codec.derive_secret(TrustTier::Low)).unwrap();

    let outcome = h.bus.publish(
        CallEnvelope::new("pagesManager", Call::module_event("getAllPages", Value::Null))
            .with_jwt(forged),
        Completion::noop(),
    );
    assert!(matches!(
        outcome,
        Dispatch::Contained {
            violation: Violation::InvalidCredential(_),
            action: ContainmentAction::Meltdown
        }
    ));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert_eq!(h.critical.lock()[0].error_code, CORE_JWT_ERROR);
}

#[tokio::test]
async fn test_exactly_once_completion_at_caller() {
    let h = harness();
    h.bus
        .subscribe("getAllPages", "pagesManager", |_, completion| {
            completion.ok(json!(["home"]));
            completion.ok(json!(["about"]));
            completion.fail(CallError::NoReply);
        })
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let token = module_token(&h.codec, "themeManager", TrustTier::Medium);
    h.bus.publish(
        CallEnvelope::new("themeManager", Call::module_event("getAllPages", Value::Null))
            .with_jwt(token.clone()),
        Completion::from_fn(move |result| {
            assert_eq!(result, Ok(json!(["home"])));
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let reply = h
        .bus
        .request(
            CallEnvelope::new("themeManager", Call::module_event("getAllPages", Value::Null))
                .with_jwt(token),
            Duration::from_millis(200),
        )
        .await;
    assert_eq!(reply, Ok(json!(["home"])));
}

#[tokio::test]
async fn test_contained_call_surfaces_as_no_reply() {
    let h = harness();
    h.bus.modules().register("pagesManager", ModuleKind::Core);
    counter(&h.bus, "getAllPages", "pagesManager");

    let reply = h
        .bus
        .request(
            CallEnvelope::new("pagesManager", Call::module_event("getAllPages", Value::Null)),
            Duration::from_secs(5),
        )
        .await;
    assert_eq!(reply, Err(CallError::NoReply));
    assert_eq!(h.critical.lock().len(), 1);
}

#[test]
fn test_critical_error_signal_is_exempt() {
    let h = harness();
    let outcome = h.bus.publish(
        CallEnvelope::new(
            "",
            Call::CriticalError(CriticalErrorSignal {
                module_name: "x".into(),
                error_code: "TEST".into(),
                message: "direct".into(),
                severity: "critical".into(),
                timestamp: 0,
            }),
        ),
        Completion::noop(),
    );
    assert_eq!(outcome, Dispatch::Dispatched { handlers: 1 });
    assert!(h.bus.has_listeners(&CallKey::Kind(CallKind::CriticalError)));
}

#[test]
fn test_core_handler_panic_melts_down_owner() {
    let h = harness();
    h.bus.modules().register("pagesManager", ModuleKind::Core);
    h.bus
        .subscribe("getAllPages", "pagesManager", |_, _| panic!("render failed"))
        .unwrap();
    let token = module_token(&h.codec, "themeManager", TrustTier::Medium);

    let outcome = h.bus.publish(
        CallEnvelope::new("themeManager", Call::module_event("getAllPages", Value::Null))
            .with_jwt(token),
        Completion::noop(),
    );
    assert!(outcome.is_dispatched());

    let critical = h.critical.lock();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].module_name, "pagesManager");
    assert_eq!(critical[0].error_code, Violation::HandlerPanic.error_code());
    assert!(h.deactivations.lock().is_empty());
    assert!(!h.bus.modules().is_quarantined("pagesManager"));
    assert_eq!(h.bus.stats().meltdowns, 1);
}

#[test]
fn test_panic_inside_critical_error_handler_is_logged_only() {
    let h = harness();
    h.bus.modules().register("pagesManager", ModuleKind::Core);
    h.bus
        .subscribe(CallKind::CriticalError, "pagesManager", |_, _| panic!("alarm"))
        .unwrap();
    h.bus
        .subscribe("getAllPages", "pagesManager", |_, _| panic!("render failed"))
        .unwrap();
    let token = module_token(&h.codec, "themeManager", TrustTier::Medium);

    h.bus.publish(
        CallEnvelope::new("themeManager", Call::module_event("getAllPages", Value::Null))
            .with_jwt(token),
        Completion::noop(),
    );

    // The monitor registered first still sees the single meltdown.
    assert_eq!(h.critical.lock().len(), 1);
    assert_eq!(h.bus.stats().meltdowns, 1);
    assert!(h.deactivations.lock().is_empty());
}

#[test]
fn test_panic_inside_deactivation_handler_is_logged_only() {
    let h = harness();
    h.bus.modules().register("demoPlugin", ModuleKind::Community);
    h.bus
        .subscribe(CallKind::DeactivateModule, "auditPlugin", |_, _| panic!("audit"))
        .unwrap();
    counter(&h.bus, "demoAction", "demoPlugin");

    h.bus.publish(
        CallEnvelope::new("demoPlugin", Call::module_event("demoAction", Value::Null)),
        Completion::noop(),
    );

    assert_eq!(h.deactivations.lock().len(), 1);
    assert!(h.bus.modules().is_quarantined("demoPlugin"));
    assert!(!h.bus.modules().is_quarantined("auditPlugin"));
    assert_eq!(h.bus.stats().deactivations, 1);
}
