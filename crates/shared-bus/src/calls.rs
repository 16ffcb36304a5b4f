//! # Call Model
//!
//! Every invocation on the bus is a [`Call`] variant with a typed payload.
//! The authorisation policy is a property of the variant, not of the string
//! it is registered under.
//!
//! ## Policies
//!
//! | Policy | Calls |
//! |--------|-------|
//! | `Exempt` | `criticalError` |
//! | `Public` | `issuePublicToken`, `deactivateModule`, `heartbeat` |
//! | `SkipJwtEligible` | `issueModuleToken`, `issueUserToken`, `validateToken`, `issueRefreshToken`, `refreshAccessToken`, `revokeRefreshToken` |
//! | `Authenticated` | everything else, including module-owned events |

use crate::completion::CallError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{has_permission, Claims, NotificationPriority, PermissionTree, TrustTier};
use std::fmt;
use uuid::Uuid;

/// Name of the module allowed to use the skip-JWT bootstrap path.
pub const AUTH_MODULE: &str = "auth";

/// Module name the bus uses for its own signals and handlers.
pub const BUS_MODULE: &str = "bus";

/// How the dispatcher authorises a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPolicy {
    /// Bus-internal signal; no checks at all.
    Exempt,
    /// Dispatched without a credential.
    Public,
    /// May be sent by `auth` with the shared bootstrap secret instead of a
    /// credential.
    SkipJwtEligible,
    /// Requires a verified credential.
    Authenticated,
}

/// Built-in call kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    IssuePublicToken,
    IssueModuleToken,
    IssueUserToken,
    ValidateToken,
    RevokeToken,
    RevokeAllTokensForUser,
    IssueRefreshToken,
    RefreshAccessToken,
    RevokeRefreshToken,
    SetTierOverride,
    Notify,
    Heartbeat,
    CriticalError,
    DeactivateModule,
}

impl CallKind {
    pub fn policy(&self) -> CallPolicy {
        match self {
            CallKind::CriticalError => CallPolicy::Exempt,
            CallKind::IssuePublicToken | CallKind::DeactivateModule | CallKind::Heartbeat => {
                CallPolicy::Public
            }
            CallKind::IssueModuleToken
            | CallKind::IssueUserToken
            | CallKind::ValidateToken
            | CallKind::IssueRefreshToken
            | CallKind::RefreshAccessToken
            | CallKind::RevokeRefreshToken => CallPolicy::SkipJwtEligible,
            CallKind::RevokeToken
            | CallKind::RevokeAllTokensForUser
            | CallKind::SetTierOverride
            | CallKind::Notify => CallPolicy::Authenticated,
        }
    }

    /// Signals the bus emits while containing a module.
    pub fn is_containment_signal(&self) -> bool {
        matches!(self, CallKind::CriticalError | CallKind::DeactivateModule)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::IssuePublicToken => "issuePublicToken",
            CallKind::IssueModuleToken => "issueModuleToken",
            CallKind::IssueUserToken => "issueUserToken",
            CallKind::ValidateToken => "validateToken",
            CallKind::RevokeToken => "revokeToken",
            CallKind::RevokeAllTokensForUser => "revokeAllTokensForUser",
            CallKind::IssueRefreshToken => "issueRefreshToken",
            CallKind::RefreshAccessToken => "refreshAccessToken",
            CallKind::RevokeRefreshToken => "revokeRefreshToken",
            CallKind::SetTierOverride => "setTierOverride",
            CallKind::Notify => "notify",
            CallKind::Heartbeat => "heartbeat",
            CallKind::CriticalError => "criticalError",
            CallKind::DeactivateModule => "deactivateModule",
        }
    }
}

/// Handler registration key.
///
/// Module events live in their own namespace, so an event that happens to
/// share a built-in name can never reach a built-in handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    Kind(CallKind),
    Event(String),
}

impl CallKey {
    pub fn event(name: impl Into<String>) -> Self {
        CallKey::Event(name.into())
    }

    pub fn policy(&self) -> CallPolicy {
        match self {
            CallKey::Kind(kind) => kind.policy(),
            CallKey::Event(_) => CallPolicy::Authenticated,
        }
    }

    pub fn is_containment_signal(&self) -> bool {
        matches!(self, CallKey::Kind(kind) if kind.is_containment_signal())
    }
}

impl From<CallKind> for CallKey {
    fn from(kind: CallKind) -> Self {
        CallKey::Kind(kind)
    }
}

impl From<&str> for CallKey {
    fn from(event: &str) -> Self {
        CallKey::Event(event.to_string())
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKey::Kind(kind) => f.write_str(kind.as_str()),
            CallKey::Event(event) => f.write_str(event),
        }
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePublicTokenRequest {
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueModuleTokenRequest {
    pub module_name: String,
    #[serde(default)]
    pub trust_tier: TrustTier,
    /// Mint for this module instead. Only honoured on the bootstrap path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_as_module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUserTokenRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_permissions: Option<PermissionTree>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllTokensRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRefreshTokenRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// What a trust-tier override applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum OverrideTarget {
    Module(String),
    Role(String),
}

/// Pin (`Some`) or unpin (`None`) a module or role to a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierOverrideRequest {
    pub target: OverrideTarget,
    #[serde(default)]
    pub tier: Option<TrustTier>,
}

/// Notification as submitted by a module, before stamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub module_name: String,
    /// Free-form on the way in; anything outside the closed set is `system`.
    #[serde(default)]
    pub notification_type: String,
    #[serde(default)]
    pub priority: NotificationPriority,
    pub message: String,
    #[serde(default)]
    pub requires_jwt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

/// Broadcast when a core module violates authorisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalErrorSignal {
    pub module_name: String,
    pub error_code: String,
    pub message: String,
    pub severity: String,
    pub timestamp: u64,
}

/// Broadcast when a community module is quarantined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationSignal {
    pub module_name: String,
    pub reason: String,
}

/// Event owned by a module, e.g. `getAllPages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// =============================================================================
// CALL
// =============================================================================

/// Closed set of bus calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", content = "data", rename_all = "camelCase")]
pub enum Call {
    IssuePublicToken(IssuePublicTokenRequest),
    IssueModuleToken(IssueModuleTokenRequest),
    IssueUserToken(IssueUserTokenRequest),
    ValidateToken(ValidateTokenRequest),
    RevokeToken(RevokeTokenRequest),
    RevokeAllTokensForUser(RevokeAllTokensRequest),
    IssueRefreshToken(IssueRefreshTokenRequest),
    RefreshAccessToken(RefreshTokenRequest),
    RevokeRefreshToken(RefreshTokenRequest),
    SetTierOverride(TierOverrideRequest),
    Notify(NotificationRequest),
    Heartbeat,
    CriticalError(CriticalErrorSignal),
    DeactivateModule(DeactivationSignal),
    Module(ModuleEvent),
}

impl Call {
    /// Module-owned event with a JSON payload.
    pub fn module_event(event: impl Into<String>, data: Value) -> Self {
        Call::Module(ModuleEvent {
            event: event.into(),
            data,
        })
    }

    /// Handler key this call is dispatched under.
    pub fn key(&self) -> CallKey {
        let kind = match self {
            Call::IssuePublicToken(_) => CallKind::IssuePublicToken,
            Call::IssueModuleToken(_) => CallKind::IssueModuleToken,
            Call::IssueUserToken(_) => CallKind::IssueUserToken,
            Call::ValidateToken(_) => CallKind::ValidateToken,
            Call::RevokeToken(_) => CallKind::RevokeToken,
            Call::RevokeAllTokensForUser(_) => CallKind::RevokeAllTokensForUser,
            Call::IssueRefreshToken(_) => CallKind::IssueRefreshToken,
            Call::RefreshAccessToken(_) => CallKind::RefreshAccessToken,
            Call::RevokeRefreshToken(_) => CallKind::RevokeRefreshToken,
            Call::SetTierOverride(_) => CallKind::SetTierOverride,
            Call::Notify(_) => CallKind::Notify,
            Call::Heartbeat => CallKind::Heartbeat,
            Call::CriticalError(_) => CallKind::CriticalError,
            Call::DeactivateModule(_) => CallKind::DeactivateModule,
            Call::Module(event) => return CallKey::Event(event.event.clone()),
        };
        CallKey::Kind(kind)
    }

    pub fn policy(&self) -> CallPolicy {
        self.key().policy()
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A call plus the caller's identity and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope {
    /// Correlation id for logs.
    pub call_id: Uuid,

    /// Module making the call.
    pub module_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,

    #[serde(default, rename = "skipJWT")]
    pub skip_jwt: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_module_secret: Option<String>,

    /// Set by an upstream layer that already authenticated the caller.
    #[serde(default)]
    pub externally_validated: bool,

    pub call: Call,
}

impl CallEnvelope {
    pub fn new(module_name: impl Into<String>, call: Call) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            module_name: module_name.into(),
            jwt: None,
            skip_jwt: false,
            auth_module_secret: None,
            externally_validated: false,
            call,
        }
    }

    /// Attach a credential.
    #[must_use]
    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }

    /// Use the bootstrap path with the shared auth-module secret.
    #[must_use]
    pub fn skip_jwt(mut self, auth_module_secret: impl Into<String>) -> Self {
        self.skip_jwt = true;
        self.auth_module_secret = Some(auth_module_secret.into());
        self
    }

    #[must_use]
    pub fn externally_validated(mut self) -> Self {
        self.externally_validated = true;
        self
    }
}

/// What a handler receives once the dispatcher has authorised a call.
#[derive(Debug, Clone)]
pub struct AuthorizedCall {
    pub envelope: CallEnvelope,
    /// Verified claims; `None` for public, exempt and bootstrap calls.
    pub claims: Option<Claims>,
}

impl AuthorizedCall {
    pub fn call(&self) -> &Call {
        &self.envelope.call
    }

    pub fn module_name(&self) -> &str {
        &self.envelope.module_name
    }

    /// Whether the call arrived on the `auth` bootstrap path.
    pub fn is_bootstrap(&self) -> bool {
        self.envelope.skip_jwt && self.claims.is_none()
    }

    /// Permission check for handlers. Calls without claims are denied.
    pub fn require_permission(&self, path: &str) -> Result<(), CallError> {
        match &self.claims {
            Some(claims) if has_permission(claims, path) => Ok(()),
            _ => Err(CallError::PermissionDenied {
                path: path.to_string(),
            }),
        }
    }
}
