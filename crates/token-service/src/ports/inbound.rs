//! # Inbound Ports (Driving Ports / API)
//!
//! The token API other modules reach through the bus.

use crate::domain::errors::TokenError;
use async_trait::async_trait;
use shared_types::{Claims, PermissionTree, TrustTier};

/// Primary Token Service API.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait TokenServiceApi: Send + Sync {
    /// Mint a module credential.
    ///
    /// `sign_as_module` mints the credential *as* another module. The bus
    /// only lets the `auth` bootstrap path use it.
    fn issue_module_token(
        &self,
        module_name: &str,
        trust_tier: TrustTier,
        sign_as_module: Option<&str>,
    ) -> Result<String, TokenError>;

    /// Mint an anonymous `Low` credential with a short fixed lifetime.
    fn issue_public_token(&self, purpose: &str) -> Result<String, TokenError>;

    /// Mint a user credential embedding the user's current token version.
    async fn issue_user_token(
        &self,
        user_id: &str,
        role: Option<&str>,
        custom_permissions: Option<PermissionTree>,
        custom_roles: Option<Vec<String>>,
    ) -> Result<String, TokenError>;

    /// Full validation: signature, expiry, revocation, token version.
    async fn validate_token(&self, token: &str) -> Result<Claims, TokenError>;

    fn revoke_token(&self, jti: &str);

    /// Revoke every credential issued to `user_id`. Returns how many.
    fn revoke_all_tokens_for_user(&self, user_id: &str) -> usize;

    async fn issue_refresh_token(&self, user_id: &str) -> Result<String, TokenError>;

    /// Exchange a refresh credential for a new user credential.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, TokenError>;

    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), TokenError>;
}
