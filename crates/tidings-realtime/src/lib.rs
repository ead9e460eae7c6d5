//! # tidings-realtime
//!
//! Live delivery for tidings.
//!
//! This crate provides:
//! - [`ConnectionRegistry`]: open stream connections grouped by scope
//! - [`EventPublisher`]: NDJSON fan-out to a scope
//! - [`WatcherSupervisor`]: one change-feed watcher per collection, broadcasting
//!   `change` events
//! - [`NotificationService`]: persisted per-user notifications pushed to their owner
//! - [`TopicPoller`]: interval polling for content without a change feed
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidings_realtime::{ConnectionRegistry, EventPublisher, WatcherConfig, WatcherSupervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let publisher = EventPublisher::new(registry.clone());
//! let shutdown = CancellationToken::new();
//!
//! let supervisor = WatcherSupervisor::new(
//!     Arc::new(db.change_feed.clone()),
//!     publisher.clone(),
//!     WatcherConfig::from_env()?,
//!     shutdown.clone(),
//! );
//! supervisor.start_all();
//!
//! // ... serve streams ...
//!
//! supervisor.shutdown().await;
//! ```

pub mod notify;
pub mod poller;
pub mod publisher;
pub mod registry;
pub mod watcher;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use notify::{NotificationPage, NotificationService, PageConfig};
pub use poller::{PollConfig, TopicPoller, POLL_ERROR_MESSAGE};
pub use publisher::{EventPublisher, PublishReport};
pub use registry::{ConnectionGuard, ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use watcher::{
    ReconnectPolicy, WatcherConfig, WatcherLease, WatcherLifetime, WatcherState,
    WatcherSupervisor,
};
