//! # Bus Handlers
//!
//! Handlers the runtime subscribes on the dispatcher.
//!
//! - `auth` - token calls served by the `auth` module
//! - `system` - heartbeat, notifications and metrics mirroring

pub mod auth;
pub mod system;

pub use auth::{register_auth_handlers, AuthContext};
pub use system::{register_system_handlers, spawn_metrics_sync, sync_metrics};

use shared_bus::{CallError, CallResult, Completion};
use std::future::Future;
use tokio::runtime::Handle;
use tracing::error;

/// Complete `completion` with the output of `work`, run on the current
/// tokio runtime.
pub(crate) fn spawn_completion<F>(completion: Completion, work: F)
where
    F: Future<Output = CallResult> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                completion.complete(work.await);
            });
        }
        Err(_) => {
            error!("Call dispatched outside a tokio runtime");
            completion.fail(CallError::service(
                "RUNTIME_UNAVAILABLE",
                "no async runtime on the dispatching thread",
            ));
        }
    }
}
