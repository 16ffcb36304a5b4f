//! # Error Types
//!
//! Parsing errors for the shared enums.

use thiserror::Error;

/// Errors produced when parsing shared types from strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// The value is not one of `High`, `Medium`, `Low`.
    #[error("Unknown trust tier: {0}")]
    UnknownTrustTier(String),

    /// The value is not one of `core`, `community`.
    #[error("Unknown module kind: {0}")]
    UnknownModuleKind(String),
}
