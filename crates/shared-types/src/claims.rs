//! # Credential Claims
//!
//! The signed body of every credential on the bus. Field names are camelCase
//! on the wire so tokens stay readable by the HTTP layer and integrations.

use crate::permissions::PermissionTree;
use crate::tiers::{SubjectKind, TrustTier};
use serde::{Deserialize, Serialize};

/// Decoded claims of a module, user or public credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Kind of principal this credential identifies.
    pub subject_kind: SubjectKind,

    /// Subject identifier (module name, user id, or `public:<purpose>`).
    pub sub: String,

    /// Module the credential speaks for (module credentials only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,

    /// User the credential speaks for (user credentials only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Why an anonymous credential was minted (public credentials only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Module that minted this credential on behalf of `module_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,

    /// Tier whose salted secret signed this credential.
    #[serde(default)]
    pub trust_tier: TrustTier,

    /// Unique credential id, used for targeted revocation.
    pub jti: String,

    /// Issued-at, Unix seconds.
    pub iat: u64,

    /// Expiry, Unix seconds.
    pub exp: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionTree>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Primary role of a user credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// The user's token version at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_version: Option<u64>,
}

impl Claims {
    /// Bare claims for a subject. `trust_tier`, `jti`, `iat` and `exp` are
    /// filled in by the signer.
    pub fn new(subject_kind: SubjectKind, sub: impl Into<String>) -> Self {
        Self {
            subject_kind,
            sub: sub.into(),
            module_name: None,
            user_id: None,
            purpose: None,
            issued_by: None,
            trust_tier: TrustTier::Low,
            jti: String::new(),
            iat: 0,
            exp: 0,
            permissions: None,
            roles: None,
            role: None,
            token_version: None,
        }
    }

    pub fn is_user(&self) -> bool {
        self.subject_kind == SubjectKind::User
    }

    pub fn is_module(&self) -> bool {
        self.subject_kind == SubjectKind::Module
    }

    /// Whether the credential has expired at `now` (Unix seconds). The
    /// `exp` second itself is still valid, as in the codec's zero-leeway
    /// verification.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp < now
    }
}
