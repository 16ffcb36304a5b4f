//! # Credential Codec
//!
//! Signs, decodes and verifies credentials as HS256 signed-claims tokens.
//!
//! ## Tier Selection
//!
//! Every credential embeds the tier it was signed under. Verification reads
//! that claim *without* checking the signature, derives the matching secret,
//! and only then verifies:
//!
//! ```text
//! token ──decode_unsafe──→ trustTier ──derive_secret──→ secret ──verify──→ Claims
//!                              │                                   │
//!                        (selection only)                  (authoritative)
//! ```
//!
//! A forged tier claim changes the signed bytes, so it can only select a
//! secret the forger does not hold.

use crate::errors::CodecError;
use crate::policy::TrustTierPolicy;
use crate::secret::SecretBytes;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use shared_types::{current_timestamp, Claims, TrustTier};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Signing algorithm for all bus credentials.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// A freshly signed credential and the claims it carries.
#[derive(Debug, Clone)]
pub struct SignedCredential {
    pub token: String,
    pub claims: Claims,
}

/// Concatenate tier salt material onto the base secret.
pub fn derive_secret(base_secret: &SecretBytes, salt: &SecretBytes) -> SecretBytes {
    let mut bytes = Vec::with_capacity(base_secret.len() + salt.len());
    bytes.extend_from_slice(base_secret.as_bytes());
    bytes.extend_from_slice(salt.as_bytes());
    SecretBytes::new(bytes)
}

/// Signs and verifies credentials for every tier.
#[derive(Debug)]
pub struct CredentialCodec {
    base_secret: SecretBytes,
    policy: Arc<TrustTierPolicy>,
}

impl CredentialCodec {
    pub fn new(base_secret: impl Into<SecretBytes>, policy: Arc<TrustTierPolicy>) -> Self {
        Self {
            base_secret: base_secret.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &Arc<TrustTierPolicy> {
        &self.policy
    }

    /// Verification secret for `tier`.
    pub fn derive_secret(&self, tier: TrustTier) -> SecretBytes {
        derive_secret(&self.base_secret, self.policy.salt(tier))
    }

    /// Sign `claims` under `tier` with the given lifetime.
    ///
    /// The tier is written into the claims before signing. A fresh `jti` is
    /// assigned unless the claims already carry one.
    pub fn sign(
        &self,
        mut claims: Claims,
        tier: TrustTier,
        expiry: Duration,
    ) -> Result<SignedCredential, CodecError> {
        let now = current_timestamp();
        claims.trust_tier = tier;
        claims.iat = now;
        claims.exp = now.saturating_add(expiry.as_secs());
        if claims.jti.is_empty() {
            claims.jti = Uuid::new_v4().to_string();
        }

        let token = encode_with_secret(&claims, &self.derive_secret(tier))?;
        Ok(SignedCredential { token, claims })
    }

    /// Sign with the tier's default lifetime.
    pub fn sign_default(&self, claims: Claims, tier: TrustTier) -> Result<SignedCredential, CodecError> {
        self.sign(claims, tier, self.policy.default_expiry(tier))
    }

    /// Structural decode with no signature or expiry check.
    ///
    /// Only for reading `trustTier` ahead of verification. The result is
    /// never an authorisation decision.
    pub fn decode_unsafe(token: &str) -> Option<Claims> {
        let mut validation = Validation::new(ALGORITHM);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }

    /// Verify signature and expiry under `secret`.
    pub fn verify(token: &str, secret: &SecretBytes) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }

    /// Decode the embedded tier, derive its secret, then verify.
    pub fn verify_embedded(&self, token: &str) -> Result<Claims, CodecError> {
        let probe = Self::decode_unsafe(token)
            .ok_or_else(|| CodecError::Malformed("token could not be decoded".to_string()))?;
        let secret = self.derive_secret(probe.trust_tier);
        Self::verify(token, &secret)
    }
}

/// Encode already-complete claims under an explicit secret.
pub fn encode_with_secret(claims: &Claims, secret: &SecretBytes) -> Result<String, CodecError> {
    jsonwebtoken::encode(
        &Header::new(ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CodecError::Signing(e.to_string()))
}
