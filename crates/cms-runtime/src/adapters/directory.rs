//! # In-Memory User Directory
//!
//! Backs `UserDirectory` with a map. Every privilege-changing action bumps
//! the user's token version, which invalidates credentials issued before it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use token_service::{DirectoryError, UserDetails, UserDirectory};
use tracing::info;

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserDetails>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user at token version 0, or return `false` if it exists.
    pub fn insert(&self, user_id: impl Into<String>, role: impl Into<String>) -> bool {
        let user_id = user_id.into();
        let mut users = self.users.write();
        if users.contains_key(&user_id) {
            return false;
        }
        users.insert(
            user_id,
            UserDetails {
                role: role.into(),
                token_version: 0,
            },
        );
        true
    }

    /// Change a user's role. Returns the new token version.
    pub fn set_role(&self, user_id: &str, role: impl Into<String>) -> Option<u64> {
        let role = role.into();
        let mut users = self.users.write();
        let details = users.get_mut(user_id)?;
        details.role = role;
        details.token_version += 1;
        info!(
            user_id,
            role = %details.role,
            token_version = details.token_version,
            "User role changed"
        );
        Some(details.token_version)
    }

    /// Invalidate every credential issued to the user so far.
    pub fn bump_token_version(&self, user_id: &str) -> Option<u64> {
        let mut users = self.users.write();
        let details = users.get_mut(user_id)?;
        details.token_version += 1;
        info!(user_id, token_version = details.token_version, "Token version bumped");
        Some(details.token_version)
    }

    pub fn remove(&self, user_id: &str) -> bool {
        self.users.write().remove(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user_details_by_id(&self, user_id: &str) -> Result<UserDetails, DirectoryError> {
        self.users
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(user_id.to_string()))
    }
}
