//! # Shared Bus - Authenticated Call Dispatch
//!
//! The in-process bus every CMS module talks through. Each call is
//! authorised before any handler sees it, and callers that break the rules
//! are contained instead of crashing the process.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  publish(envelope)  ┌──────────────┐  AuthorizedCall  ┌──────────────┐
//! │   Module A   │ ──────────────────→ │  Dispatcher  │ ───────────────→ │   Module B   │
//! │              │ ←─ ─ ─ ─ ─ ─ ─ ─ ─ ─│              │                  │   handler    │
//! └──────────────┘     Completion      └──────┬───────┘                  └──────────────┘
//!                                             │ violation
//!                                             ▼
//!                              meltdown (Core) / deactivation (Community)
//! ```
//!
//! ## Security
//!
//! - **Tier-derived verification:** credentials verify under the secret of
//!   the tier they claim; a forged claim cannot verify
//! - **Envelope identity:** a module credential must name the calling module
//! - **Redacted logs:** credential fields never reach a log sink

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod calls;
pub mod completion;
pub mod containment;
pub mod dispatcher;
pub mod notifier;
pub mod redact;
pub mod registry;

pub use calls::{
    AuthorizedCall, Call, CallEnvelope, CallKey, CallKind, CallPolicy, CriticalErrorSignal,
    DeactivationSignal, IssueModuleTokenRequest, IssuePublicTokenRequest, IssueRefreshTokenRequest,
    IssueUserTokenRequest, ModuleEvent, NotificationRequest, OverrideTarget, RefreshTokenRequest,
    RevokeAllTokensRequest, RevokeTokenRequest, TierOverrideRequest, ValidateTokenRequest,
    AUTH_MODULE, BUS_MODULE,
};
pub use completion::{CallError, CallResult, Completion};
pub use containment::{
    ContainmentAction, Violation, CORE_HANDLER_PANIC, CORE_IMPERSONATION_ERROR, CORE_JWT_ERROR,
    CORE_SKIPJWT_ERROR,
};
pub use dispatcher::{BusError, Dispatch, DispatchStats, Dispatcher, Handler, RejectReason, SubscriptionId};
pub use notifier::{
    DropReason, NotificationFilter, NotificationSink, NotificationStream, NotificationSubscription,
    Notifier, NotifyOutcome, SubscriptionError,
};
pub use redact::{redact_for_log, redact_value, REDACTED_FIELDS};
pub use registry::ModuleRegistry;

use std::time::Duration;

/// Notifications buffered per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Timeout callers use for `Dispatcher::request` unless they have a reason
/// to pick another.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
