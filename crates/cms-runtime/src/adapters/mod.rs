//! # Adapters
//!
//! Port implementations the runtime wires into the token service and the
//! notification side-channel.

pub mod directory;
pub mod refresh_store;
pub mod sinks;

pub use directory::InMemoryUserDirectory;
pub use refresh_store::InMemoryRefreshStore;
pub use sinks::{LogNotificationSink, MetricsNotificationSink};
