//! # Token Service
//!
//! Application service implementing `TokenServiceApi`.
//!
//! ## Validation Steps (in order)
//!
//! 1. **Decode**: read the embedded trust tier without verifying
//! 2. **Verify**: signature and expiry under that tier's derived secret
//! 3. **Revocation**: reject if the `jti` is in the revocation index
//! 4. **Version**: for user credentials, re-fetch the user's token version
//!    and require an exact match

use crate::domain::errors::TokenError;
use crate::domain::revocation::RevocationIndex;
use crate::ports::inbound::TokenServiceApi;
use crate::ports::outbound::{DirectoryError, RefreshTokenStore, UserDirectory};
use async_trait::async_trait;
use rand::RngCore;
use shared_crypto::CredentialCodec;
use shared_types::permissions::wildcard_tree;
use shared_types::{current_timestamp, Claims, PermissionTree, SubjectKind, TrustTier};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Role that is granted the wildcard permission.
pub const ADMIN_ROLE: &str = "admin";

/// Tunables that are not per-tier.
#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    /// Lifetime of anonymous bootstrap credentials.
    pub public_token_expiry: Duration,
    /// Lifetime of refresh credentials.
    pub refresh_token_expiry: Duration,
}

impl Default for TokenServiceConfig {
    fn default() -> Self {
        Self {
            public_token_expiry: Duration::from_secs(5 * 60),
            refresh_token_expiry: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Token service over a user directory `D` and refresh store `S`.
pub struct TokenService<D: UserDirectory, S: RefreshTokenStore> {
    codec: Arc<CredentialCodec>,
    revocations: Arc<RevocationIndex>,
    directory: D,
    refresh_store: S,
    config: TokenServiceConfig,
}

impl<D: UserDirectory, S: RefreshTokenStore> TokenService<D, S> {
    pub fn new(
        codec: Arc<CredentialCodec>,
        revocations: Arc<RevocationIndex>,
        directory: D,
        refresh_store: S,
        config: TokenServiceConfig,
    ) -> Self {
        Self {
            codec,
            revocations,
            directory,
            refresh_store,
            config,
        }
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub fn revocations(&self) -> &RevocationIndex {
        &self.revocations
    }

    /// Longest lifetime of any credential this service signs.
    fn longest_lifetime(&self) -> Duration {
        self.codec
            .policy()
            .max_expiry()
            .max(self.config.public_token_expiry)
    }

    async fn user_details(&self, user_id: &str) -> Result<crate::UserDetails, TokenError> {
        self.directory
            .get_user_details_by_id(user_id)
            .await
            .map_err(|e| match e {
                DirectoryError::NotFound(id) => TokenError::UserNotFound(id),
                DirectoryError::Unavailable(reason) => TokenError::Directory(reason),
            })
    }
}

#[async_trait]
impl<D: UserDirectory, S: RefreshTokenStore> TokenServiceApi for TokenService<D, S> {
    fn issue_module_token(
        &self,
        module_name: &str,
        trust_tier: TrustTier,
        sign_as_module: Option<&str>,
    ) -> Result<String, TokenError> {
        let subject = sign_as_module.unwrap_or(module_name);
        let tier = self.codec.policy().tier_for_module(subject, trust_tier);

        let mut claims = Claims::new(SubjectKind::Module, subject);
        claims.module_name = Some(subject.to_string());
        if sign_as_module.is_some() {
            claims.issued_by = Some(module_name.to_string());
        }

        let signed = self.codec.sign_default(claims, tier)?;
        info!(
            module = subject,
            issued_by = module_name,
            tier = %tier,
            jti = %signed.claims.jti,
            "Module credential issued"
        );
        Ok(signed.token)
    }

    fn issue_public_token(&self, purpose: &str) -> Result<String, TokenError> {
        let mut claims = Claims::new(SubjectKind::Public, format!("public:{purpose}"));
        claims.purpose = Some(purpose.to_string());

        let signed = self
            .codec
            .sign(claims, TrustTier::Low, self.config.public_token_expiry)?;
        debug!(purpose, jti = %signed.claims.jti, "Public credential issued");
        Ok(signed.token)
    }

    async fn issue_user_token(
        &self,
        user_id: &str,
        role: Option<&str>,
        custom_permissions: Option<PermissionTree>,
        custom_roles: Option<Vec<String>>,
    ) -> Result<String, TokenError> {
        let details = self.user_details(user_id).await?;
        let role = role.unwrap_or(details.role.as_str()).to_string();
        let tier = self.codec.policy().tier_for_role(&role);

        let permissions = if role == ADMIN_ROLE {
            let mut tree = custom_permissions.unwrap_or_default();
            tree.extend(wildcard_tree());
            Some(tree)
        } else {
            custom_permissions
        };

        let mut claims = Claims::new(SubjectKind::User, user_id);
        claims.user_id = Some(user_id.to_string());
        claims.permissions = permissions;
        claims.roles = Some(custom_roles.unwrap_or_else(|| vec![role.clone()]));
        claims.role = Some(role.clone());
        claims.token_version = Some(details.token_version);

        let signed = self.codec.sign_default(claims, tier)?;
        self.revocations.track(
            user_id,
            &signed.claims.jti,
            signed.claims.exp,
            current_timestamp(),
        );

        info!(
            user_id,
            role = %role,
            tier = %tier,
            token_version = details.token_version,
            jti = %signed.claims.jti,
            "User credential issued"
        );
        Ok(signed.token)
    }

    async fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.codec.verify_embedded(token)?;

        if self.revocations.is_revoked(&claims.jti) {
            warn!(jti = %claims.jti, "Revoked credential presented");
            return Err(TokenError::Revoked { jti: claims.jti });
        }

        if claims.is_user() {
            let user_id = claims.user_id.as_deref().unwrap_or(claims.sub.as_str());
            let details = self.user_details(user_id).await?;
            if claims.token_version != Some(details.token_version) {
                warn!(
                    user_id,
                    presented = ?claims.token_version,
                    current = details.token_version,
                    "Stale user credential presented"
                );
                return Err(TokenError::VersionMismatch {
                    presented: claims.token_version,
                    current: details.token_version,
                });
            }
        }

        Ok(claims)
    }

    fn revoke_token(&self, jti: &str) {
        let now = current_timestamp();
        // Any credential we signed is gone by then.
        let retain_until = now.saturating_add(self.longest_lifetime().as_secs());
        self.revocations.revoke(jti, retain_until, now);
        info!(jti, "Credential revoked");
    }

    fn revoke_all_tokens_for_user(&self, user_id: &str) -> usize {
        let revoked = self
            .revocations
            .revoke_all_for_user(user_id, current_timestamp());
        info!(user_id, count = revoked.len(), "All user credentials revoked");
        revoked.len()
    }

    async fn issue_refresh_token(&self, user_id: &str) -> Result<String, TokenError> {
        let token = random_refresh_token();
        let expires_at =
            current_timestamp().saturating_add(self.config.refresh_token_expiry.as_secs());

        self.refresh_store
            .put(user_id, &token, expires_at)
            .await
            .map_err(|e| TokenError::Store(e.0))?;

        info!(user_id, expires_at, "Refresh credential issued");
        Ok(token)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, TokenError> {
        let record = self
            .refresh_store
            .get(refresh_token)
            .await
            .map_err(|e| TokenError::Store(e.0))?
            .ok_or(TokenError::InvalidRefreshToken)?;

        if record.is_expired_at(current_timestamp()) {
            self.refresh_store
                .delete(refresh_token)
                .await
                .map_err(|e| TokenError::Store(e.0))?;
            warn!(user_id = %record.user_id, "Expired refresh credential evicted");
            return Err(TokenError::RefreshTokenExpired);
        }

        self.issue_user_token(&record.user_id, None, None, None).await
    }

    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), TokenError> {
        self.refresh_store
            .delete(refresh_token)
            .await
            .map_err(|e| TokenError::Store(e.0))?;
        info!("Refresh credential revoked");
        Ok(())
    }
}

/// 32 random bytes, hex encoded.
fn random_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
