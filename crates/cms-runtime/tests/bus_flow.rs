//! End-to-end flows through the wired runtime: bootstrap, module calls,
//! user credentials, refresh rotation and containment.

use cms_runtime::adapters::{InMemoryRefreshStore, InMemoryUserDirectory};
use cms_runtime::{CmsRuntime, RuntimeConfig, ServiceContainer};
use cms_telemetry::CmsMetrics;
use prometheus::Registry;
use serde_json::{json, Value};
use shared_bus::{
    Call, CallEnvelope, CallError, CallKind, IssueRefreshTokenRequest, IssueUserTokenRequest,
    NotificationFilter, NotificationRequest, RefreshTokenRequest, RevokeAllTokensRequest,
    ValidateTokenRequest, AUTH_MODULE,
};
use shared_types::{NotificationPriority, NotificationType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

struct Fixture {
    runtime: CmsRuntime,
    directory: Arc<InMemoryUserDirectory>,
    credentials: BTreeMap<String, String>,
}

async fn fixture() -> Fixture {
    let env = HashMap::from([
        ("CMS_JWT_SECRET", "integration-base-secret-0123456789abcdef"),
        ("CMS_AUTH_MODULE_SECRET", "integration-auth-secret-0123456789abcd"),
        ("CMS_NOTIFICATION_SECRET", "integration-notify"),
        ("CMS_TIER_SALT_HIGH", "int-high"),
        ("CMS_TIER_SALT_MEDIUM", "int-medium"),
        ("CMS_TIER_SALT_LOW", "int-low"),
        ("CMS_CORE_MODULES", "auth,pagesManager,themeManager"),
        ("CMS_COMMUNITY_MODULES", "demoPlugin"),
    ]);
    let config = RuntimeConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
    config.validate().unwrap();

    let directory = Arc::new(InMemoryUserDirectory::new());
    directory.insert("42", "editor");
    directory.insert("7", "admin");

    let container = ServiceContainer::new(
        config,
        directory.clone(),
        Arc::new(InMemoryRefreshStore::new()),
        CmsMetrics::register(&Registry::new()).unwrap(),
    );
    let runtime = CmsRuntime::new(container).unwrap();
    let credentials = runtime.bootstrap_modules().await.unwrap();

    Fixture {
        runtime,
        directory,
        credentials,
    }
}

impl Fixture {
    fn credential(&self, module: &str) -> String {
        self.credentials[module].clone()
    }

    async fn as_module(&self, module: &str, call: Call) -> Result<Value, CallError> {
        let envelope = CallEnvelope::new(module, call).with_jwt(self.credential(module));
        self.runtime.container().bus.request(envelope, TIMEOUT).await
    }

    async fn bootstrap(&self, call: Call) -> Result<Value, CallError> {
        let container = self.runtime.container();
        container
            .bus
            .request(container.bootstrap_envelope(call), TIMEOUT)
            .await
    }

    async fn user_token(&self, user_id: &str) -> String {
        let reply = self
            .bootstrap(Call::IssueUserToken(IssueUserTokenRequest {
                user_id: user_id.into(),
                role: None,
                custom_permissions: None,
                custom_roles: None,
            }))
            .await
            .unwrap();
        reply["token"].as_str().unwrap().to_string()
    }

    async fn validate(&self, token: &str) -> Result<Value, CallError> {
        self.as_module(
            "pagesManager",
            Call::ValidateToken(ValidateTokenRequest {
                token: token.into(),
            }),
        )
        .await
    }
}

#[tokio::test]
async fn test_bootstrap_issues_a_credential_per_module() {
    let f = fixture().await;
    let modules: Vec<_> = f.credentials.keys().cloned().collect();
    assert_eq!(modules, vec!["auth", "demoPlugin", "pagesManager", "themeManager"]);

    let claims = f.validate(&f.credential("themeManager")).await.unwrap();
    assert_eq!(claims["moduleName"], "themeManager");
    assert_eq!(claims["trustTier"], "High");
    assert_eq!(claims["issuedBy"], AUTH_MODULE);

    let community = f.validate(&f.credential("demoPlugin")).await.unwrap();
    assert_eq!(community["trustTier"], "Low");
}

#[tokio::test]
async fn test_module_event_between_modules() {
    let f = fixture().await;
    f.runtime
        .container()
        .bus
        .subscribe("getAllPages", "pagesManager", |call, completion| {
            let caller = call.module_name().to_string();
            completion.ok(json!({ "pages": ["home", "about"], "for": caller }));
        })
        .unwrap();

    let reply = f
        .as_module("themeManager", Call::module_event("getAllPages", Value::Null))
        .await
        .unwrap();
    assert_eq!(reply["pages"], json!(["home", "about"]));
    assert_eq!(reply["for"], "themeManager");
}

#[tokio::test]
async fn test_user_credential_lifecycle() {
    let f = fixture().await;
    let token = f.user_token("42").await;

    let claims = f.validate(&token).await.unwrap();
    assert_eq!(claims["userId"], "42");
    assert_eq!(claims["role"], "editor");
    assert_eq!(claims["trustTier"], "Medium");

    // Promotion bumps the version; the old credential stops validating.
    f.directory.set_role("42", "admin");
    match f.validate(&token).await {
        Err(CallError::Service { code, .. }) => assert_eq!(code, "TOKEN_VERSION_MISMATCH"),
        other => panic!("expected version mismatch, got {other:?}"),
    }

    let promoted = f.validate(&f.user_token("42").await).await.unwrap();
    assert_eq!(promoted["trustTier"], "High");
    assert_eq!(promoted["permissions"], json!({ "*": true }));
}

#[tokio::test]
async fn test_user_can_revoke_own_credentials() {
    let f = fixture().await;
    let first = f.user_token("42").await;
    let second = f.user_token("42").await;

    let reply = f
        .runtime
        .container()
        .bus
        .request(
            CallEnvelope::new(
                "accountSettings",
                Call::RevokeAllTokensForUser(RevokeAllTokensRequest {
                    user_id: "42".into(),
                }),
            )
            .with_jwt(first.clone()),
            TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(reply["revoked"], 2);

    for token in [first, second] {
        match f.validate(&token).await {
            Err(CallError::Service { code, .. }) => assert_eq!(code, "TOKEN_REVOKED"),
            other => panic!("expected revocation, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_user_cannot_revoke_someone_else() {
    let f = fixture().await;
    let editor = f.user_token("42").await;

    let denied = f
        .runtime
        .container()
        .bus
        .request(
            CallEnvelope::new(
                "accountSettings",
                Call::RevokeAllTokensForUser(RevokeAllTokensRequest {
                    user_id: "7".into(),
                }),
            )
            .with_jwt(editor),
            TIMEOUT,
        )
        .await;
    assert!(matches!(denied, Err(CallError::PermissionDenied { .. })));
}

#[tokio::test]
async fn test_refresh_rotation() {
    let f = fixture().await;
    let issued = f
        .bootstrap(Call::IssueRefreshToken(IssueRefreshTokenRequest {
            user_id: "42".into(),
        }))
        .await
        .unwrap();
    let refresh_token = issued["refreshToken"].as_str().unwrap().to_string();

    let refreshed = f
        .bootstrap(Call::RefreshAccessToken(RefreshTokenRequest {
            refresh_token: refresh_token.clone(),
        }))
        .await
        .unwrap();
    let claims = f.validate(refreshed["token"].as_str().unwrap()).await.unwrap();
    assert_eq!(claims["userId"], "42");

    f.bootstrap(Call::RevokeRefreshToken(RefreshTokenRequest {
        refresh_token: refresh_token.clone(),
    }))
    .await
    .unwrap();
    match f
        .bootstrap(Call::RefreshAccessToken(RefreshTokenRequest { refresh_token }))
        .await
    {
        Err(CallError::Service { code, .. }) => assert_eq!(code, "INVALID_REFRESH_TOKEN"),
        other => panic!("expected unknown refresh token, got {other:?}"),
    }
}

#[tokio::test]
async fn test_community_module_presenting_core_credential_is_deactivated() {
    let f = fixture().await;
    let bus = &f.runtime.container().bus;
    bus.subscribe("galleryUpload", "demoPlugin", |_, completion| {
        completion.ok(Value::Null);
    })
    .unwrap();

    let reply = bus
        .request(
            CallEnvelope::new("demoPlugin", Call::module_event("galleryUpload", Value::Null))
                .with_jwt(f.credential("pagesManager")),
            TIMEOUT,
        )
        .await;
    assert_eq!(reply, Err(CallError::NoReply));
    assert!(bus.modules().is_quarantined("demoPlugin"));
    assert!(!bus.has_listeners(&"galleryUpload".into()));

    // Its own valid credential does not bring it back.
    let reply = f
        .as_module("demoPlugin", Call::module_event("galleryUpload", Value::Null))
        .await;
    assert_eq!(reply, Err(CallError::NoReply));
    assert_eq!(bus.stats().deactivations, 1);
}

#[tokio::test]
async fn test_signed_notification_reaches_subscribers() {
    let f = fixture().await;
    let notifier = f.runtime.container().notifier.clone();
    let mut alerts = notifier.subscribe(
        NotificationFilter::all().with_types(vec![NotificationType::Security]),
    );
    let jwt = notifier
        .sign_credential("pagesManager", Duration::from_secs(60))
        .unwrap();

    let reply = f
        .as_module(
            "pagesManager",
            Call::Notify(NotificationRequest {
                module_name: "pagesManager".into(),
                notification_type: "security".into(),
                priority: NotificationPriority::High,
                message: "repeated login failures".into(),
                requires_jwt: true,
                jwt: Some(jwt),
            }),
        )
        .await
        .unwrap();
    assert_eq!(reply["delivered"], true);

    let event = alerts.recv().await.unwrap();
    assert_eq!(event.message, "repeated login failures");
    assert_eq!(event.priority, NotificationPriority::High);

    // Without its credential the notification is dropped, not failed.
    let reply = f
        .as_module(
            "pagesManager",
            Call::Notify(NotificationRequest {
                module_name: "pagesManager".into(),
                notification_type: "security".into(),
                priority: NotificationPriority::High,
                message: "unsigned".into(),
                requires_jwt: true,
                jwt: None,
            }),
        )
        .await
        .unwrap();
    assert_eq!(reply["delivered"], false);
}

#[tokio::test]
async fn test_runtime_start_and_shutdown() {
    let mut f = fixture().await;
    f.runtime.start();
    let reply = f
        .runtime
        .container()
        .bus
        .request(CallEnvelope::new("monitor", Call::Heartbeat), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(reply["status"], "ok");
    assert!(f.runtime.container().bus.has_listeners(&CallKind::Notify.into()));
    f.runtime.shutdown().await;
}
