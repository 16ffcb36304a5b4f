//! # Permission Evaluator
//!
//! Permissions are a nested tree of string keys. A `true` leaf grants the
//! exact path that reaches it; `"*": true` at any level grants everything
//! beneath that level.
//!
//! ```text
//! { "pages": { "read": true, "admin": { "*": true } } }
//!
//! pages.read          -> granted
//! pages.admin.delete  -> granted (wildcard)
//! pages.write         -> denied  (missing)
//! pages.read.drafts   -> denied  (cannot descend below a leaf)
//! ```

use crate::claims::Claims;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key that grants everything beneath the level it appears on.
pub const WILDCARD: &str = "*";

/// A permission tree level.
pub type PermissionTree = BTreeMap<String, PermissionNode>;

/// One node of a permission tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionNode {
    Leaf(bool),
    Tree(PermissionTree),
}

impl PermissionNode {
    fn is_granted(&self) -> bool {
        matches!(self, PermissionNode::Leaf(true))
    }
}

/// Tree granting everything: `{"*": true}`.
pub fn wildcard_tree() -> PermissionTree {
    let mut tree = PermissionTree::new();
    tree.insert(WILDCARD.to_string(), PermissionNode::Leaf(true));
    tree
}

fn has_wildcard(level: &PermissionTree) -> bool {
    level.get(WILDCARD).is_some_and(PermissionNode::is_granted)
}

/// Check whether `claims` grant the dot-separated `path`.
pub fn has_permission(claims: &Claims, path: &str) -> bool {
    match claims.permissions.as_ref() {
        Some(tree) => tree_grants(tree, path),
        None => false,
    }
}

/// Check a dot-separated `path` against a permission tree.
pub fn tree_grants(tree: &PermissionTree, path: &str) -> bool {
    if has_wildcard(tree) {
        return true;
    }
    if path.is_empty() {
        return false;
    }

    let segments: Vec<&str> = path.split('.').collect();
    let last = segments.len() - 1;
    let mut level = tree;

    for (index, segment) in segments.iter().enumerate() {
        if has_wildcard(level) {
            return true;
        }
        match level.get(*segment) {
            None => return false,
            Some(PermissionNode::Leaf(granted)) => return *granted && index == last,
            Some(PermissionNode::Tree(next)) => {
                if index == last {
                    return has_wildcard(next);
                }
                level = next;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::SubjectKind;
    use serde_json::json;

    fn claims_with(permissions: serde_json::Value) -> Claims {
        let mut claims = Claims::new(SubjectKind::User, "7");
        claims.permissions = Some(serde_json::from_value(permissions).unwrap());
        claims
    }

    #[test]
    fn test_root_wildcard_grants_any_path() {
        let claims = claims_with(json!({"*": true}));
        assert!(has_permission(&claims, "any.deep.path"));
        assert!(has_permission(&claims, "x"));
    }

    #[test]
    fn test_cannot_descend_below_leaf() {
        let claims = claims_with(json!({"a": {"b": true}}));
        assert!(has_permission(&claims, "a.b"));
        assert!(!has_permission(&claims, "a.b.c"));
    }

    #[test]
    fn test_nested_wildcard_short_circuits() {
        let claims = claims_with(json!({"pages": {"admin": {"*": true}, "read": true}}));
        assert!(has_permission(&claims, "pages.admin.delete.all"));
        assert!(has_permission(&claims, "pages.admin"));
        assert!(has_permission(&claims, "pages.read"));
        assert!(!has_permission(&claims, "pages.write"));
        assert!(!has_permission(&claims, "media.read"));
    }

    #[test]
    fn test_false_leaf_and_subtree_end_deny() {
        let claims = claims_with(json!({"media": {"upload": false, "share": {"link": true}}}));
        assert!(!has_permission(&claims, "media.upload"));
        assert!(!has_permission(&claims, "media.share"));
        assert!(has_permission(&claims, "media.share.link"));
    }

    #[test]
    fn test_wildcard_false_does_not_grant() {
        let claims = claims_with(json!({"*": false, "a": true}));
        assert!(!has_permission(&claims, "b"));
        assert!(has_permission(&claims, "a"));
    }

    #[test]
    fn test_missing_permissions_and_empty_path_deny() {
        let claims = Claims::new(SubjectKind::Public, "public:bootstrap");
        assert!(!has_permission(&claims, "pages.read"));

        let claims = claims_with(json!({"a": true}));
        assert!(!has_permission(&claims, ""));
    }
}
