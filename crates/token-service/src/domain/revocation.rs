//! # Revocation Index
//!
//! Revoked credential ids plus a per-user index of every `jti` the service
//! has issued, so all of a user's credentials can be revoked at once.
//!
//! ## Retention
//!
//! - Each revoked `jti` is kept through the last second the credential it
//!   names is valid; after that the signature check already rejects it.
//! - Per-user entries are dropped once their credential has expired.
//! - Garbage collection runs opportunistically every `gc_interval_secs`.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct TrackedCredential {
    jti: String,
    expires_at: u64,
}

#[derive(Debug, Default)]
struct RevocationState {
    /// Revoked jti -> earliest time it may be forgotten.
    revoked: HashMap<String, u64>,
    /// User id -> credentials issued to that user.
    by_user: HashMap<String, Vec<TrackedCredential>>,
    last_gc: u64,
}

/// Thread-safe revocation state shared by the token service.
#[derive(Debug)]
pub struct RevocationIndex {
    state: RwLock<RevocationState>,
    gc_interval_secs: u64,
}

impl RevocationIndex {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: u64 = 60;

    pub fn new() -> Self {
        Self::with_gc_interval(Self::DEFAULT_GC_INTERVAL)
    }

    pub fn with_gc_interval(gc_interval_secs: u64) -> Self {
        Self {
            state: RwLock::new(RevocationState::default()),
            gc_interval_secs,
        }
    }

    /// Record a credential issued to `user_id`.
    pub fn track(&self, user_id: &str, jti: &str, expires_at: u64, now: u64) {
        let mut state = self.state.write();
        self.maybe_collect(&mut state, now);
        state
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .push(TrackedCredential {
                jti: jti.to_string(),
                expires_at,
            });
    }

    /// Revoke a single credential id. `retain_until` must be no earlier than
    /// the credential's own expiry.
    pub fn revoke(&self, jti: &str, retain_until: u64, now: u64) {
        let mut state = self.state.write();
        self.maybe_collect(&mut state, now);
        let entry = state.revoked.entry(jti.to_string()).or_insert(retain_until);
        *entry = (*entry).max(retain_until);
    }

    /// Revoke every tracked credential of `user_id`. Returns the revoked ids.
    pub fn revoke_all_for_user(&self, user_id: &str, now: u64) -> Vec<String> {
        let mut state = self.state.write();
        self.maybe_collect(&mut state, now);

        let Some(tracked) = state.by_user.remove(user_id) else {
            return Vec::new();
        };

        let mut revoked = Vec::with_capacity(tracked.len());
        for credential in tracked {
            let entry = state
                .revoked
                .entry(credential.jti.clone())
                .or_insert(credential.expires_at);
            *entry = (*entry).max(credential.expires_at);
            revoked.push(credential.jti);
        }
        revoked
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.state.read().revoked.contains_key(jti)
    }

    /// Number of revoked ids currently retained.
    pub fn revoked_count(&self) -> usize {
        self.state.read().revoked.len()
    }

    /// Number of credentials tracked for `user_id`.
    pub fn tracked_for_user(&self, user_id: &str) -> usize {
        self.state
            .read()
            .by_user
            .get(user_id)
            .map_or(0, Vec::len)
    }

    /// Drop everything whose retention horizon has passed.
    pub fn garbage_collect(&self, now: u64) {
        let mut state = self.state.write();
        Self::collect(&mut state, now);
        state.last_gc = now;
    }

    fn maybe_collect(&self, state: &mut RevocationState, now: u64) {
        if now.saturating_sub(state.last_gc) > self.gc_interval_secs {
            Self::collect(state, now);
            state.last_gc = now;
        }
    }

    fn collect(state: &mut RevocationState, now: u64) {
        let before = state.revoked.len();
        state.revoked.retain(|_, retain_until| *retain_until >= now);
        state.by_user.retain(|_, tracked| {
            tracked.retain(|credential| credential.expires_at >= now);
            !tracked.is_empty()
        });
        debug!(
            pruned = before - state.revoked.len(),
            retained = state.revoked.len(),
            "Revocation index collected"
        );
    }
}

impl Default for RevocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoke_single() {
        let index = RevocationIndex::new();
        index.revoke("a", 200, 100);
        assert!(index.is_revoked("a"));
        assert!(!index.is_revoked("b"));
    }

    #[test]
    fn test_revoke_all_for_user() {
        let index = RevocationIndex::new();
        index.track("42", "j1", 500, 100);
        index.track("42", "j2", 600, 100);
        index.track("7", "j3", 600, 100);

        let mut revoked = index.revoke_all_for_user("42", 100);
        revoked.sort();
        assert_eq!(revoked, vec!["j1".to_string(), "j2".to_string()]);
        assert!(index.is_revoked("j1"));
        assert!(index.is_revoked("j2"));
        assert!(!index.is_revoked("j3"));
        assert_eq!(index.tracked_for_user("42"), 0);
        assert!(index.revoke_all_for_user("unknown", 100).is_empty());
    }

    #[test]
    fn test_entries_survive_until_credential_expiry() {
        let index = RevocationIndex::with_gc_interval(0);
        index.revoke("a", 200, 100);

        index.garbage_collect(200);
        assert!(index.is_revoked("a"));

        index.garbage_collect(201);
        assert!(!index.is_revoked("a"));
    }

    #[test]
    fn test_retention_never_shrinks() {
        let index = RevocationIndex::new();
        index.revoke("a", 500, 100);
        index.revoke("a", 200, 100);
        index.garbage_collect(300);
        assert!(index.is_revoked("a"));
    }

    #[test]
    fn test_periodic_collection_prunes_tracked_credentials() {
        let index = RevocationIndex::with_gc_interval(10);
        index.track("42", "old", 105, 100);
        index.track("42", "new", 1_000, 100);

        // Triggers collection: 200 - 100 > 10.
        index.track("7", "other", 1_000, 200);
        assert_eq!(index.tracked_for_user("42"), 1);
        assert_eq!(index.tracked_for_user("7"), 1);
    }
}
