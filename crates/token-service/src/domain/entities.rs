//! # Token Service Entities

use serde::{Deserialize, Serialize};

/// What the user directory knows about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub role: String,
    /// Bumped by the directory on every privilege-changing action.
    pub token_version: u64,
}

/// A persisted refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub user_id: String,
    pub token: String,
    /// Unix seconds.
    pub expires_at: u64,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}
