//! # Completion Guard
//!
//! Handlers answer a call through a [`Completion`]. Only the first
//! `complete` has any effect; every later one is a no-op. The gate is an
//! atomic flag, so clones held by spawned tasks race safely.
//!
//! A completion that is dropped without firing drops its callback too. For
//! [`Completion::channel`] that closes the receiver, which is how
//! `Dispatcher::request` observes a call that was never dispatched.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::trace;

/// Error slot of a call result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The caller's claims do not grant `path`.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// The payload could not be handled.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A downstream service failed. `code` is stable and machine-readable.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// No answer arrived: the call was rejected or contained, or the
    /// caller's timeout elapsed first.
    #[error("No reply")]
    NoReply,
}

impl CallError {
    pub fn service(code: impl Into<String>, message: impl fmt::Display) -> Self {
        CallError::Service {
            code: code.into(),
            message: message.to_string(),
        }
    }
}

/// Result delivered to a caller.
pub type CallResult = Result<Value, CallError>;

type Callback = Box<dyn FnOnce(CallResult) + Send>;

struct CompletionInner {
    fired: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

/// Exactly-once completion handle.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Completion {
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        Self {
            inner: Arc::new(CompletionInner {
                fired: AtomicBool::new(false),
                callback: Mutex::new(Some(Box::new(callback))),
            }),
        }
    }

    /// Completion backed by a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<CallResult>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::from_fn(move |result| {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    /// Completion for fire-and-forget calls.
    pub fn noop() -> Self {
        Self::from_fn(|_| {})
    }

    /// Deliver `result`. Returns `false` if the call was already completed.
    pub fn complete(&self, result: CallResult) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            trace!("Duplicate completion ignored");
            return false;
        }
        let callback = self.inner.callback.lock().take();
        if let Some(callback) = callback {
            callback(result);
        }
        true
    }

    pub fn ok(&self, value: Value) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: CallError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_completed(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_second_completion_is_ignored() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let completion = Completion::from_fn(move |result| {
            assert_eq!(result, Ok(json!(1)));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(completion.ok(json!(1)));
        assert!(!completion.ok(json!(2)));
        assert!(!completion.fail(CallError::NoReply));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(completion.is_completed());
    }

    #[test]
    fn test_clones_share_the_gate() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let completion = Completion::from_fn(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let clone = completion.clone();

        clone.ok(Value::Null);
        completion.ok(Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_delivers_first_result() {
        let (completion, rx) = Completion::channel();
        completion.ok(json!("first"));
        completion.ok(json!("second"));
        assert_eq!(rx.await.unwrap(), Ok(json!("first")));
    }

    #[tokio::test]
    async fn test_dropped_completion_closes_channel() {
        let (completion, rx) = Completion::channel();
        drop(completion);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_completions_fire_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let completion = Completion::from_fn(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let completion = completion.clone();
                tokio::spawn(async move { completion.ok(json!(i)) })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
