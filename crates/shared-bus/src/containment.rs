//! # Containment
//!
//! What the dispatcher does when a caller breaks the authorisation rules.
//!
//! | Caller kind | Action |
//! |-------------|--------|
//! | `Core` | **Meltdown**: critical log, critical `system` notification, `criticalError` broadcast |
//! | `Core`, envelope externally validated | Logged only |
//! | `Community` or unregistered | **Deactivation**: `deactivateModule` broadcast, handlers removed, module quarantined |
//!
//! Neither action terminates the process, and neither completes the
//! caller's call.

use shared_crypto::CodecError;
use thiserror::Error;

/// Error code for credential failures of a core module.
pub const CORE_JWT_ERROR: &str = "CORE_JWT_ERROR";

/// Error code for a core module misusing the bootstrap path.
pub const CORE_SKIPJWT_ERROR: &str = "CORE_SKIPJWT_ERROR";

/// Error code for a core module presenting another module's identity.
pub const CORE_IMPERSONATION_ERROR: &str = "CORE_IMPERSONATION_ERROR";

/// Error code for a core module whose handler panicked.
pub const CORE_HANDLER_PANIC: &str = "CORE_HANDLER_PANIC";

/// Severity carried by every `criticalError` signal.
pub const CRITICAL_SEVERITY: &str = "critical";

/// An authorisation violation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("missing credential")]
    MissingCredential,

    #[error("skipJWT not permitted for this caller or call")]
    SkipJwtMisuse,

    #[error("credential rejected: {0}")]
    InvalidCredential(CodecError),

    /// The credential or the request names a different module.
    #[error("impersonation of module '{impersonated}'")]
    Impersonation { impersonated: String },

    #[error("handler panicked")]
    HandlerPanic,
}

impl Violation {
    /// Code carried by the `criticalError` signal of a meltdown.
    pub fn error_code(&self) -> &'static str {
        match self {
            Violation::MissingCredential | Violation::InvalidCredential(_) => CORE_JWT_ERROR,
            Violation::SkipJwtMisuse => CORE_SKIPJWT_ERROR,
            Violation::Impersonation { .. } => CORE_IMPERSONATION_ERROR,
            Violation::HandlerPanic => CORE_HANDLER_PANIC,
        }
    }
}

/// What containment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentAction {
    Meltdown,
    /// Core violation on an externally validated envelope; logged only.
    Suppressed,
    Deactivated,
}

impl ContainmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainmentAction::Meltdown => "meltdown",
            ContainmentAction::Suppressed => "suppressed",
            ContainmentAction::Deactivated => "deactivated",
        }
    }
}
