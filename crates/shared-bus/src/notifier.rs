//! # Notification Side-Channel
//!
//! Fire-and-forget notifications fanned out to sinks over a
//! `tokio::sync::broadcast` channel.
//!
//! ```text
//! notify(request) ──→ type check ──→ credential check ──→ stamp ──→ broadcast
//!                     (→ system)     (requiresJwt only)              │
//!                                                     ┌──────────────┼──────────────┐
//!                                                     ▼              ▼              ▼
//!                                                   sink           sink         subscription
//! ```
//!
//! A notification that requires a credential is verified under the
//! dedicated notification secret, never a tier secret. A failed check drops
//! the notification with a warning; nothing is returned to the sender.

use crate::calls::NotificationRequest;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use shared_crypto::{encode_with_secret, CodecError, CredentialCodec, SecretBytes};
use shared_types::{
    current_timestamp, Claims, NotificationEvent, NotificationPriority, NotificationType,
    SubjectKind,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Notification channel closed")]
    Closed,
}

/// Why a notification was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingCredential,
    InvalidCredential(CodecError),
}

/// Result of [`Notifier::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Published; `receivers` subscriptions were live.
    Delivered {
        event: NotificationEvent,
        receivers: usize,
    },
    Dropped(DropReason),
}

/// Subscription filter. Empty `types` accepts every type.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub types: Vec<NotificationType>,
    pub min_priority: NotificationPriority,
}

impl NotificationFilter {
    /// Accept everything, including `Low` priority.
    pub fn all() -> Self {
        Self {
            types: Vec::new(),
            min_priority: NotificationPriority::Low,
        }
    }

    #[must_use]
    pub fn with_types(mut self, types: Vec<NotificationType>) -> Self {
        self.types = types;
        self
    }

    #[must_use]
    pub fn with_min_priority(mut self, min_priority: NotificationPriority) -> Self {
        self.min_priority = min_priority;
        self
    }

    pub fn matches(&self, event: &NotificationEvent) -> bool {
        (self.types.is_empty() || self.types.contains(&event.notification_type))
            && event.priority >= self.min_priority
    }
}

/// Integration that consumes notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: NotificationEvent);
}

/// The notification side-channel.
pub struct Notifier {
    sender: broadcast::Sender<NotificationEvent>,
    secret: SecretBytes,
    published: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl Notifier {
    pub fn new(secret: impl Into<SecretBytes>) -> Self {
        Self::with_capacity(secret, DEFAULT_CHANNEL_CAPACITY)
    }

    /// A zero `capacity` is raised to one; the broadcast channel needs a slot.
    pub fn with_capacity(secret: impl Into<SecretBytes>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            secret: secret.into(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            capacity,
        }
    }

    /// Validate, stamp and publish a module's notification.
    pub fn notify(&self, request: NotificationRequest) -> NotifyOutcome {
        if request.requires_jwt {
            let verified = match request.jwt.as_deref() {
                None => Err(DropReason::MissingCredential),
                Some(jwt) => CredentialCodec::verify(jwt, &self.secret)
                    .map_err(DropReason::InvalidCredential),
            };
            if let Err(reason) = verified {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    module = %request.module_name,
                    reason = ?reason,
                    "Notification dropped: credential check failed"
                );
                return NotifyOutcome::Dropped(reason);
            }
        }

        let event = NotificationEvent {
            module_name: request.module_name,
            notification_type: NotificationType::parse_lenient(&request.notification_type),
            priority: request.priority,
            message: request.message,
            timestamp: current_timestamp(),
        };
        let receivers = self.publish(event.clone());
        NotifyOutcome::Delivered { event, receivers }
    }

    /// Publish an already-stamped event. Returns the number of receivers.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let module = event.module_name.clone();
        let kind = event.notification_type;

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(module = %module, kind = %kind, receivers, "Notification published");
                receivers
            }
            Err(_) => {
                debug!(module = %module, kind = %kind, "Notification had no receivers");
                0
            }
        }
    }

    /// Credential a module presents with `requiresJwt` notifications.
    pub fn sign_credential(&self, module_name: &str, lifetime: Duration) -> Result<String, CodecError> {
        let now = current_timestamp();
        let mut claims = Claims::new(SubjectKind::Module, module_name);
        claims.module_name = Some(module_name.to_string());
        claims.jti = Uuid::new_v4().to_string();
        claims.iat = now;
        claims.exp = now.saturating_add(lifetime.as_secs());
        encode_with_secret(&claims, &self.secret)
    }

    pub fn subscribe(&self, filter: NotificationFilter) -> NotificationSubscription {
        NotificationSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn stream(&self, filter: NotificationFilter) -> NotificationStream {
        NotificationStream {
            inner: BroadcastStream::new(self.sender.subscribe()),
            filter,
        }
    }

    /// Forward every matching notification to `sink` until the channel
    /// closes.
    pub fn spawn_sink(
        &self,
        sink: Arc<dyn NotificationSink>,
        filter: NotificationFilter,
    ) -> JoinHandle<()> {
        let mut subscription = self.subscribe(filter);
        tokio::spawn(async move {
            debug!(sink = sink.name(), "Notification sink attached");
            while let Some(event) = subscription.recv().await {
                sink.deliver(event).await;
            }
            debug!(sink = sink.name(), "Notification sink detached");
        })
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Receiving half of a notification subscription.
pub struct NotificationSubscription {
    receiver: broadcast::Receiver<NotificationEvent>,
    filter: NotificationFilter,
}

impl NotificationSubscription {
    /// Next matching event, or `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Notification subscriber lagged");
                    continue;
                }
            };
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking receive. `Ok(None)` means nothing is queued.
    pub fn try_recv(&mut self) -> Result<Option<NotificationEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };
            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }
}

/// `Stream` over matching notifications.
pub struct NotificationStream {
    inner: BroadcastStream<NotificationEvent>,
    filter: NotificationFilter,
}

impl Stream for NotificationStream {
    type Item = NotificationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(event)) if self.filter.matches(&event) => return Poll::Ready(Some(event)),
                Some(Ok(_)) => continue,
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    warn!(lagged = count, "Notification stream lagged");
                    continue;
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
