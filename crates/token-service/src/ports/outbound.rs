//! # Outbound Ports (Driven Ports / SPI)
//!
//! Collaborators the token service needs but does not own.

use crate::domain::entities::{RefreshTokenRecord, UserDetails};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error from user-directory lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("User {0} not found")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Error from the refresh-credential store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Refresh store failure: {0}")]
pub struct StoreError(pub String);

/// User directory, owned by the users module.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Current role and token version of `user_id`.
    async fn get_user_details_by_id(&self, user_id: &str) -> Result<UserDetails, DirectoryError>;
}

/// Persistence for long-lived refresh credentials.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn put(&self, user_id: &str, token: &str, expires_at: u64) -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn get_user_details_by_id(&self, user_id: &str) -> Result<UserDetails, DirectoryError> {
        (**self).get_user_details_by_id(user_id).await
    }
}

#[async_trait]
impl<T: RefreshTokenStore + ?Sized> RefreshTokenStore for Arc<T> {
    async fn put(&self, user_id: &str, token: &str, expires_at: u64) -> Result<(), StoreError> {
        (**self).put(user_id, token, expires_at).await
    }

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        (**self).get(token).await
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        (**self).delete(token).await
    }
}
