//! Core traits for tidings abstractions.
//!
//! These traits define the seams between the realtime services and the store,
//! enabling the PostgreSQL backends in `tidings-db` and in-memory backends for
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTIFICATION REPOSITORY
// =============================================================================

/// Persistence for per-user notifications.
///
/// Every mutating call is scoped by owner: a record that exists but belongs to
/// another user behaves exactly like a record that does not exist.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Persist a new unread notification for `user_id`.
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification>;

    /// List a user's notifications, newest first.
    async fn list(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>>;

    /// Count a user's unread notifications.
    async fn unread_count(&self, user_id: Uuid) -> Result<i64>;

    /// Mark one notification read. Returns false if not found or not owned.
    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Mark every unread notification of a user read. Returns how many flipped.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64>;

    /// Delete one notification. Returns false if not found or not owned.
    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool>;
}

// =============================================================================
// USER DIRECTORY
// =============================================================================

/// Read-only view of the user table owned by the CRUD layer.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Ids of every active user, in a stable order.
    async fn active_user_ids(&self) -> Result<Vec<Uuid>>;
}

// =============================================================================
// POLLED TOPIC ACTIVITY
// =============================================================================

/// Source of "most recent item" timestamps for the polling fallback.
#[async_trait]
pub trait TopicActivitySource: Send + Sync {
    /// Timestamp of the newest item under `topic`, or `None` if it has none.
    async fn latest_activity(&self, topic: &Topic) -> Result<Option<DateTime<Utc>>>;
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// Opens change-capture subscriptions on the store.
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
    /// Open a subscription to mutations of `collection`.
    ///
    /// An error here is a subscription failure.
    async fn subscribe(&self, collection: &str) -> Result<Box<dyn ChangeSubscription>>;
}

/// A live change-capture subscription for one collection.
#[async_trait]
pub trait ChangeSubscription: Send {
    /// Wait for the next mutation.
    ///
    /// `Ok(None)` means the feed ended; `Err` means the subscription itself
    /// failed. Payloads that cannot be interpreted are skipped by the
    /// implementation rather than reported here.
    async fn next_change(&mut self) -> Result<Option<ChangeOperation>>;

    /// Release the store-side subscription.
    async fn close(self: Box<Self>) -> Result<()>;
}
