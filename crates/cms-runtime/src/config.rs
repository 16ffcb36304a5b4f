//! # Runtime Configuration
//!
//! Secrets, tier salts, credential lifetimes and the module classification
//! table, all read from the environment.
//!
//! ## Security Requirements
//!
//! - `CMS_JWT_SECRET` and `CMS_AUTH_MODULE_SECRET` MUST be at least
//!   [`MIN_SECRET_LEN`] bytes
//! - Tier salts and the notification secret MUST NOT be empty
//! - Boot aborts on any [`ConfigError`]; there are no insecure defaults

use shared_crypto::{SecretBytes, TierSettings, TrustTierPolicy};
use shared_types::TrustTier;
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use thiserror::Error;
use token_service::TokenServiceConfig;

/// Minimum length of the signing and bootstrap secrets, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

pub const ENV_JWT_SECRET: &str = "CMS_JWT_SECRET";
pub const ENV_AUTH_MODULE_SECRET: &str = "CMS_AUTH_MODULE_SECRET";
pub const ENV_NOTIFICATION_SECRET: &str = "CMS_NOTIFICATION_SECRET";
pub const ENV_CORE_MODULES: &str = "CMS_CORE_MODULES";
pub const ENV_COMMUNITY_MODULES: &str = "CMS_COMMUNITY_MODULES";
pub const ENV_PUBLIC_TOKEN_EXPIRY: &str = "CMS_PUBLIC_TOKEN_EXPIRY";
pub const ENV_REFRESH_TOKEN_EXPIRY: &str = "CMS_REFRESH_TOKEN_EXPIRY";

/// Modules classified `Core` when `CMS_CORE_MODULES` is unset.
pub const DEFAULT_CORE_MODULES: &[&str] = &["auth", "pagesManager", "themeManager", "settings"];

/// Configuration errors. Every variant is fatal at boot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingSecret(&'static str),

    #[error("{var} is {len} bytes, at least {min} required")]
    SecretTooShort {
        var: &'static str,
        len: usize,
        min: usize,
    },

    #[error("Salt for the {0} tier is empty")]
    EmptySalt(TrustTier),

    #[error("{var} has invalid value '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroExpiry(&'static str),

    #[error("Module '{0}' is listed as both core and community")]
    ConflictingModule(String),
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub secrets: SecretsConfig,
    pub tiers: TierConfig,
    pub tokens: TokenConfig,
    pub modules: ModuleConfig,
}

/// Signing and bootstrap secrets.
#[derive(Debug, Clone)]
pub struct SecretsConfig {
    /// Base secret; each tier signs under `base || salt`.
    pub jwt_secret: SecretBytes,
    /// Shared secret the `auth` module presents on the skip-JWT path.
    pub auth_module_secret: SecretBytes,
    /// Verifies credentials attached to notifications.
    pub notification_secret: SecretBytes,
}

/// Salt and default lifetime per tier.
#[derive(Debug, Clone)]
pub struct TierConfig {
    pub high: TierSettings,
    pub medium: TierSettings,
    pub low: TierSettings,
}

impl TierConfig {
    pub fn to_policy(&self) -> TrustTierPolicy {
        TrustTierPolicy::new(self.high.clone(), self.medium.clone(), self.low.clone())
    }

    fn settings(&self) -> [(TrustTier, &TierSettings); 3] {
        [
            (TrustTier::High, &self.high),
            (TrustTier::Medium, &self.medium),
            (TrustTier::Low, &self.low),
        ]
    }
}

/// Lifetimes that are not tied to a tier.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub public_token_expiry: Duration,
    pub refresh_token_expiry: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        let defaults = TokenServiceConfig::default();
        Self {
            public_token_expiry: defaults.public_token_expiry,
            refresh_token_expiry: defaults.refresh_token_expiry,
        }
    }
}

impl From<&TokenConfig> for TokenServiceConfig {
    fn from(tokens: &TokenConfig) -> Self {
        TokenServiceConfig {
            public_token_expiry: tokens.public_token_expiry,
            refresh_token_expiry: tokens.refresh_token_expiry,
        }
    }
}

/// Module classification applied at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    pub core: Vec<String>,
    pub community: Vec<String>,
}

impl RuntimeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`. Values are not validated here;
    /// call [`RuntimeConfig::validate`] before use.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |var: &'static str| {
            lookup(var)
                .map(SecretBytes::from)
                .ok_or(ConfigError::MissingSecret(var))
        };

        let secrets = SecretsConfig {
            jwt_secret: secret(ENV_JWT_SECRET)?,
            auth_module_secret: secret(ENV_AUTH_MODULE_SECRET)?,
            notification_secret: secret(ENV_NOTIFICATION_SECRET)?,
        };

        let tier = |salt_var: &'static str, expiry_var: &'static str, default: Duration| {
            let salt = secret(salt_var)?;
            let expiry = parse_secs(&lookup, expiry_var, default)?;
            Ok::<_, ConfigError>(TierSettings::new(salt, expiry))
        };

        let tiers = TierConfig {
            high: tier(
                "CMS_TIER_SALT_HIGH",
                "CMS_TOKEN_EXPIRY_HIGH",
                TrustTierPolicy::DEFAULT_HIGH_EXPIRY,
            )?,
            medium: tier(
                "CMS_TIER_SALT_MEDIUM",
                "CMS_TOKEN_EXPIRY_MEDIUM",
                TrustTierPolicy::DEFAULT_MEDIUM_EXPIRY,
            )?,
            low: tier(
                "CMS_TIER_SALT_LOW",
                "CMS_TOKEN_EXPIRY_LOW",
                TrustTierPolicy::DEFAULT_LOW_EXPIRY,
            )?,
        };

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            public_token_expiry: parse_secs(
                &lookup,
                ENV_PUBLIC_TOKEN_EXPIRY,
                token_defaults.public_token_expiry,
            )?,
            refresh_token_expiry: parse_secs(
                &lookup,
                ENV_REFRESH_TOKEN_EXPIRY,
                token_defaults.refresh_token_expiry,
            )?,
        };

        let modules = ModuleConfig {
            core: lookup(ENV_CORE_MODULES)
                .map(|value| parse_list(&value))
                .unwrap_or_else(|| DEFAULT_CORE_MODULES.iter().map(|m| m.to_string()).collect()),
            community: lookup(ENV_COMMUNITY_MODULES)
                .map(|value| parse_list(&value))
                .unwrap_or_default(),
        };

        Ok(Self {
            secrets,
            tiers,
            tokens,
            modules,
        })
    }

    /// Validate configuration for boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, secret) in [
            (ENV_JWT_SECRET, &self.secrets.jwt_secret),
            (ENV_AUTH_MODULE_SECRET, &self.secrets.auth_module_secret),
        ] {
            if secret.is_empty() {
                return Err(ConfigError::MissingSecret(var));
            }
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::SecretTooShort {
                    var,
                    len: secret.len(),
                    min: MIN_SECRET_LEN,
                });
            }
        }
        if self.secrets.notification_secret.is_empty() {
            return Err(ConfigError::MissingSecret(ENV_NOTIFICATION_SECRET));
        }

        for (tier, settings) in self.tiers.settings() {
            if settings.salt.is_empty() {
                return Err(ConfigError::EmptySalt(tier));
            }
            if settings.default_expiry.is_zero() {
                return Err(ConfigError::ZeroExpiry(match tier {
                    TrustTier::High => "CMS_TOKEN_EXPIRY_HIGH",
                    TrustTier::Medium => "CMS_TOKEN_EXPIRY_MEDIUM",
                    TrustTier::Low => "CMS_TOKEN_EXPIRY_LOW",
                }));
            }
        }
        if self.tokens.public_token_expiry.is_zero() {
            return Err(ConfigError::ZeroExpiry(ENV_PUBLIC_TOKEN_EXPIRY));
        }
        if self.tokens.refresh_token_expiry.is_zero() {
            return Err(ConfigError::ZeroExpiry(ENV_REFRESH_TOKEN_EXPIRY));
        }

        let core: HashSet<&str> = self.modules.core.iter().map(String::as_str).collect();
        if let Some(conflict) = self
            .modules
            .community
            .iter()
            .find(|name| core.contains(name.as_str()))
        {
            return Err(ConfigError::ConflictingModule(conflict.clone()));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    pub(crate) fn test_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_JWT_SECRET, "a".repeat(MIN_SECRET_LEN)),
            (ENV_AUTH_MODULE_SECRET, "b".repeat(MIN_SECRET_LEN)),
            (ENV_NOTIFICATION_SECRET, "notify".to_string()),
            ("CMS_TIER_SALT_HIGH", "salt-high".to_string()),
            ("CMS_TIER_SALT_MEDIUM", "salt-medium".to_string()),
            ("CMS_TIER_SALT_LOW", "salt-low".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<RuntimeConfig, ConfigError> {
        RuntimeConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&test_env()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.tiers.high.default_expiry, TrustTierPolicy::DEFAULT_HIGH_EXPIRY);
        assert_eq!(config.tiers.low.default_expiry, TrustTierPolicy::DEFAULT_LOW_EXPIRY);
        assert_eq!(config.tokens.public_token_expiry, Duration::from_secs(300));
        assert!(config.modules.core.contains(&"auth".to_string()));
        assert!(config.modules.community.is_empty());
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let mut env = test_env();
        env.remove(ENV_JWT_SECRET);
        assert_eq!(load(&env).unwrap_err(), ConfigError::MissingSecret(ENV_JWT_SECRET));
    }

    #[test]
    fn test_short_secret_is_fatal() {
        let mut env = test_env();
        env.insert(ENV_AUTH_MODULE_SECRET, "short".into());
        let config = load(&env).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::SecretTooShort {
                var: ENV_AUTH_MODULE_SECRET,
                len: 5,
                min: MIN_SECRET_LEN
            }
        );
    }

    #[test]
    fn test_empty_salt_is_fatal() {
        let mut env = test_env();
        env.insert("CMS_TIER_SALT_MEDIUM", String::new());
        let config = load(&env).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::EmptySalt(TrustTier::Medium)
        );
    }

    #[test]
    fn test_expiry_overrides_and_errors() {
        let mut env = test_env();
        env.insert("CMS_TOKEN_EXPIRY_HIGH", "120".into());
        let config = load(&env).unwrap();
        assert_eq!(config.tiers.high.default_expiry, Duration::from_secs(120));

        env.insert(ENV_REFRESH_TOKEN_EXPIRY, "soon".into());
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::InvalidValue { var: ENV_REFRESH_TOKEN_EXPIRY, .. }
        ));

        env.insert(ENV_REFRESH_TOKEN_EXPIRY, "0".into());
        assert_eq!(
            load(&env).unwrap().validate().unwrap_err(),
            ConfigError::ZeroExpiry(ENV_REFRESH_TOKEN_EXPIRY)
        );
    }

    #[test]
    fn test_module_lists() {
        let mut env = test_env();
        env.insert(ENV_CORE_MODULES, "auth, pagesManager ,".into());
        env.insert(ENV_COMMUNITY_MODULES, "demoPlugin,gallery".into());
        let config = load(&env).unwrap();
        assert_eq!(config.modules.core, vec!["auth", "pagesManager"]);
        assert_eq!(config.modules.community, vec!["demoPlugin", "gallery"]);
        config.validate().unwrap();

        env.insert(ENV_COMMUNITY_MODULES, "pagesManager".into());
        assert_eq!(
            load(&env).unwrap().validate().unwrap_err(),
            ConfigError::ConflictingModule("pagesManager".into())
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&test_env()).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains(&"a".repeat(MIN_SECRET_LEN)));
        assert!(!printed.contains("salt-high"));
    }
}
