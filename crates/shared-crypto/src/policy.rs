//! # Trust-Tier Policy
//!
//! Per-tier salt material and default credential lifetime, plus in-memory
//! override maps that pin a module or a role to a specific tier.

use crate::secret::SecretBytes;
use parking_lot::RwLock;
use shared_types::TrustTier;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Salt and default lifetime for one tier.
#[derive(Debug, Clone)]
pub struct TierSettings {
    pub salt: SecretBytes,
    pub default_expiry: Duration,
}

impl TierSettings {
    pub fn new(salt: impl Into<SecretBytes>, default_expiry: Duration) -> Self {
        Self {
            salt: salt.into(),
            default_expiry,
        }
    }
}

/// Tier table shared by the codec, the token service and the dispatcher.
#[derive(Debug)]
pub struct TrustTierPolicy {
    high: TierSettings,
    medium: TierSettings,
    low: TierSettings,
    module_overrides: RwLock<HashMap<String, TrustTier>>,
    role_overrides: RwLock<HashMap<String, TrustTier>>,
}

impl TrustTierPolicy {
    /// Default lifetime of `High` credentials.
    pub const DEFAULT_HIGH_EXPIRY: Duration = Duration::from_secs(60 * 60);

    /// Default lifetime of `Medium` credentials.
    pub const DEFAULT_MEDIUM_EXPIRY: Duration = Duration::from_secs(4 * 60 * 60);

    /// Default lifetime of `Low` credentials.
    pub const DEFAULT_LOW_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(high: TierSettings, medium: TierSettings, low: TierSettings) -> Self {
        Self {
            high,
            medium,
            low,
            module_overrides: RwLock::new(HashMap::new()),
            role_overrides: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self, tier: TrustTier) -> &TierSettings {
        match tier {
            TrustTier::High => &self.high,
            TrustTier::Medium => &self.medium,
            TrustTier::Low => &self.low,
        }
    }

    pub fn salt(&self, tier: TrustTier) -> &SecretBytes {
        &self.settings(tier).salt
    }

    pub fn default_expiry(&self, tier: TrustTier) -> Duration {
        self.settings(tier).default_expiry
    }

    /// Longest default lifetime across all tiers. No credential signed with a
    /// default expiry outlives this.
    pub fn max_expiry(&self) -> Duration {
        TrustTier::ALL
            .iter()
            .map(|tier| self.default_expiry(*tier))
            .max()
            .unwrap_or(Self::DEFAULT_LOW_EXPIRY)
    }

    /// Tier a module credential is minted at: the override if one is set,
    /// otherwise what the caller asked for.
    pub fn tier_for_module(&self, module_name: &str, requested: TrustTier) -> TrustTier {
        self.module_overrides
            .read()
            .get(module_name)
            .copied()
            .unwrap_or(requested)
    }

    /// Tier a user credential is minted at for `role`.
    ///
    /// Overrides win; otherwise `admin` is `High`, `editor` and `manager`
    /// are `Medium`, everything else is `Low`.
    pub fn tier_for_role(&self, role: &str) -> TrustTier {
        if let Some(tier) = self.role_overrides.read().get(role) {
            return *tier;
        }
        match role {
            "admin" => TrustTier::High,
            "editor" | "manager" => TrustTier::Medium,
            _ => TrustTier::Low,
        }
    }

    pub fn set_module_override(&self, module_name: impl Into<String>, tier: TrustTier) {
        let module_name = module_name.into();
        info!(module = %module_name, tier = %tier, "Module trust tier override set");
        self.module_overrides.write().insert(module_name, tier);
    }

    pub fn remove_module_override(&self, module_name: &str) -> Option<TrustTier> {
        self.module_overrides.write().remove(module_name)
    }

    pub fn set_role_override(&self, role: impl Into<String>, tier: TrustTier) {
        let role = role.into();
        info!(role = %role, tier = %tier, "Role trust tier override set");
        self.role_overrides.write().insert(role, tier);
    }

    pub fn remove_role_override(&self, role: &str) -> Option<TrustTier> {
        self.role_overrides.write().remove(role)
    }
}
