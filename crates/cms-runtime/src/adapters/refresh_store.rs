//! # In-Memory Refresh Store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use token_service::{RefreshTokenRecord, RefreshTokenStore, StoreError};
use tracing::debug;

/// Refresh credentials keyed by token. Lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRefreshStore {
    records: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop records that expired at or before `now`. Returns how many.
    pub fn purge_expired(&self, now: u64) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        let purged = before - records.len();
        if purged > 0 {
            debug!(purged, "Expired refresh credentials purged");
        }
        purged
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshStore {
    async fn put(&self, user_id: &str, token: &str, expires_at: u64) -> Result<(), StoreError> {
        self.records.write().insert(
            token.to_string(),
            RefreshTokenRecord {
                user_id: user_id.to_string(),
                token: token.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.records.read().get(token).cloned())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.records.write().remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryRefreshStore::new();
        store.put("u1", "tok", 100).await.unwrap();

        let record = store.get("tok").await.unwrap().unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.expires_at, 100);

        store.delete("tok").await.unwrap();
        assert!(store.get("tok").await.unwrap().is_none());
        // Deleting twice is fine.
        store.delete("tok").await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryRefreshStore::new();
        store.put("u1", "old", 10).await.unwrap();
        store.put("u1", "new", 1_000).await.unwrap();

        assert_eq!(store.purge_expired(10), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("new").await.unwrap().is_some());
    }
}
