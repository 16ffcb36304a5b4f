//! # Shared Types Crate
//!
//! Types that every participant on the authenticated bus agrees on.
//!
//! ## Design Principles
//!
//! - **Claims carry identity**: the subject of a credential lives in its
//!   signed claims, never in a side table.
//! - **Tier is data, not authority**: `Claims::trust_tier` only selects which
//!   secret to try; the signature check under that secret is what counts.
//! - **Pure evaluation**: permission checks are plain functions over claims.

pub mod claims;
pub mod errors;
pub mod notification;
pub mod permissions;
pub mod tiers;

pub use claims::Claims;
pub use errors::TypeError;
pub use notification::{NotificationEvent, NotificationPriority, NotificationType};
pub use permissions::{has_permission, tree_grants, wildcard_tree, PermissionNode, PermissionTree};
pub use tiers::{ModuleKind, SubjectKind, TrustTier};

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in seconds.
///
/// If the system clock is before `UNIX_EPOCH` this returns 0 instead of
/// panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
