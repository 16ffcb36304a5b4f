//! # Trust Tiers and Subject Classification
//!
//! A credential's trust tier selects the salted secret it is verified under.
//! Modules are classified as `Core` or `Community`, which decides the
//! containment action the bus takes when one of them misbehaves.

use crate::errors::TypeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trust tier embedded in every credential.
///
/// Deserialisation is lenient: a missing or unrecognised tier becomes `Low`,
/// so a malformed claim can only ever select the weakest secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TrustTier {
    /// Core infrastructure modules and administrators.
    High,
    /// Editors, managers and trusted integrations.
    Medium,
    /// Everything else, including anonymous callers.
    #[default]
    Low,
}

impl TrustTier {
    /// All tiers, strongest first.
    pub const ALL: [TrustTier; 3] = [TrustTier::High, TrustTier::Medium, TrustTier::Low];

    /// Parse a tier, falling back to `Low` for anything unrecognised.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::High => "High",
            TrustTier::Medium => "Medium",
            TrustTier::Low => "Low",
        }
    }
}

impl FromStr for TrustTier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(TrustTier::High),
            "medium" => Ok(TrustTier::Medium),
            "low" => Ok(TrustTier::Low),
            _ => Err(TypeError::UnknownTrustTier(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for TrustTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(s)) => TrustTier::parse_lenient(&s),
            _ => TrustTier::Low,
        })
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of principal a credential was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    /// A module of the CMS (pages manager, database manager, plugins...).
    Module,
    /// A human user known to the user directory.
    User,
    /// An anonymous caller holding a bootstrap credential.
    Public,
}

/// Containment class of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Shipped with the CMS. Violations trigger a meltdown broadcast.
    Core,
    /// Third-party or unknown. Violations deactivate the module.
    #[default]
    Community,
}

impl FromStr for ModuleKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(ModuleKind::Core),
            "community" => Ok(ModuleKind::Community),
            _ => Err(TypeError::UnknownModuleKind(s.to_string())),
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Core => f.write_str("core"),
            ModuleKind::Community => f.write_str("community"),
        }
    }
}
