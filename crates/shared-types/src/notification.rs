//! # Notification Events
//!
//! Fire-and-forget events surfaced to operators and integrations through the
//! notification side-channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of notification categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Security,
    #[default]
    System,
    User,
}

impl NotificationType {
    /// Parse a category, falling back to `System` for anything outside the
    /// closed set.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "security" => NotificationType::Security,
            "user" => NotificationType::User,
            _ => NotificationType::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Security => "security",
            NotificationType::System => "system",
            NotificationType::User => "user",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A stamped notification as delivered to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Module the notification is about (or was raised by).
    pub module_name: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    pub priority: NotificationPriority,

    pub message: String,

    /// Unix seconds, stamped by the side-channel.
    pub timestamp: u64,
}
