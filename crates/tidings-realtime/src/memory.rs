//! In-memory implementations of the storage and feed traits.
//!
//! Used by unit tests here and, through the `mock` feature, by the API crate's
//! router tests. Each type exposes failure switches so error paths can be
//! driven deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use tidings_core::{
    ChangeFeedSource, ChangeOperation, ChangeSubscription, Error, NewNotification, Notification,
    NotificationRepository, Result, Topic, TopicActivitySource, UserDirectory,
};

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Notification store kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    rows: Mutex<Vec<Notification>>,
    failing_users: Mutex<HashSet<Uuid>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert for `user_id` fail.
    pub fn fail_inserts_for(&self, user_id: Uuid) {
        self.failing_users.lock().insert(user_id);
    }

    /// All stored notifications of a user, oldest first.
    pub fn stored_for(&self, user_id: Uuid) -> Vec<Notification> {
        self.rows
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification> {
        if self.failing_users.lock().contains(&user_id) {
            return Err(Error::Internal(format!("insert rejected for {}", user_id)));
        }
        let now = Utc::now();
        let notification = Notification {
            id: tidings_core::new_v7(),
            user_id,
            title: new.title.clone(),
            message: new.message.clone(),
            kind: new.kind,
            is_read: false,
            related: new.related.clone(),
            action_url: new.action_url.clone(),
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().push(notification.clone());
        Ok(notification)
    }

    async fn list(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let rows = self.rows.lock();
        Ok(rows
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
            Some(n) => {
                n.is_read = true;
                n.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock();
        let now = Utc::now();
        let mut flipped = 0;
        for n in rows
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.updated_at = now;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|n| !(n.id == id && n.user_id == user_id));
        Ok(rows.len() != before)
    }
}

// =============================================================================
// USERS
// =============================================================================

/// Fixed set of active users.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<Vec<Uuid>>,
    failing: Mutex<bool>,
}

impl InMemoryUserDirectory {
    pub fn new(users: Vec<Uuid>) -> Self {
        Self {
            users: Mutex::new(users),
            failing: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn active_user_ids(&self) -> Result<Vec<Uuid>> {
        if *self.failing.lock() {
            return Err(Error::Internal("user directory unavailable".into()));
        }
        Ok(self.users.lock().clone())
    }
}

// =============================================================================
// TOPIC ACTIVITY
// =============================================================================

/// Latest-item timestamps per topic.
#[derive(Debug, Default)]
pub struct InMemoryTopicActivity {
    latest: Mutex<HashMap<Topic, DateTime<Utc>>>,
    failing: Mutex<bool>,
    queries: AtomicUsize,
}

impl InMemoryTopicActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, topic: &Topic, at: DateTime<Utc>) {
        self.latest.lock().insert(topic.clone(), at);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Number of queries served so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopicActivitySource for InMemoryTopicActivity {
    async fn latest_activity(&self, topic: &Topic) -> Result<Option<DateTime<Utc>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(Error::Internal("comment query failed".into()));
        }
        Ok(self.latest.lock().get(topic).copied())
    }
}

// =============================================================================
// CHANGE FEED
// =============================================================================

type ChangeSender = mpsc::UnboundedSender<std::result::Result<ChangeOperation, String>>;

#[derive(Debug, Default)]
struct FeedState {
    senders: HashMap<String, Vec<ChangeSender>>,
    failing: HashSet<String>,
    subscribe_calls: HashMap<String, usize>,
    closed: HashMap<String, usize>,
}

/// Change feed driven by the test: [`emit`](Self::emit) pushes a mutation to
/// every open subscription of a collection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChangeFeed {
    state: Arc<Mutex<FeedState>>,
    open: Arc<Mutex<HashMap<String, usize>>>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `op` to every open subscription of `collection`. Returns the
    /// number of subscriptions reached.
    pub fn emit(&self, collection: &str, op: ChangeOperation) -> usize {
        let state = self.state.lock();
        state
            .senders
            .get(collection)
            .map_or(0, |senders| senders.iter().filter(|tx| tx.send(Ok(op)).is_ok()).count())
    }

    /// Break every open subscription of `collection` with an error.
    pub fn break_subscriptions(&self, collection: &str, message: &str) {
        let mut state = self.state.lock();
        if let Some(senders) = state.senders.remove(collection) {
            for tx in senders {
                let _ = tx.send(Err(message.to_string()));
            }
        }
    }

    /// Make new subscriptions to `collection` fail (or succeed again).
    pub fn set_failing(&self, collection: &str, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.failing.insert(collection.to_string());
        } else {
            state.failing.remove(collection);
        }
    }

    /// Times `subscribe` was called for `collection`, failed calls included.
    pub fn subscribe_calls(&self, collection: &str) -> usize {
        self.state
            .lock()
            .subscribe_calls
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Subscriptions of `collection` that are still alive.
    pub fn open_subscriptions(&self, collection: &str) -> usize {
        self.open.lock().get(collection).copied().unwrap_or(0)
    }

    /// Subscriptions of `collection` released through `close`.
    pub fn closed_subscriptions(&self, collection: &str) -> usize {
        self.state
            .lock()
            .closed
            .get(collection)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChangeFeedSource for InMemoryChangeFeed {
    async fn subscribe(&self, collection: &str) -> Result<Box<dyn ChangeSubscription>> {
        let mut state = self.state.lock();
        *state
            .subscribe_calls
            .entry(collection.to_string())
            .or_default() += 1;
        if state.failing.contains(collection) {
            return Err(Error::Feed(format!("subscribe to {} refused", collection)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .senders
            .entry(collection.to_string())
            .or_default()
            .push(tx);
        *self.open.lock().entry(collection.to_string()).or_default() += 1;

        Ok(Box::new(InMemorySubscription {
            collection: collection.to_string(),
            rx,
            state: Arc::clone(&self.state),
            open: Arc::clone(&self.open),
        }))
    }
}

struct InMemorySubscription {
    collection: String,
    rx: mpsc::UnboundedReceiver<std::result::Result<ChangeOperation, String>>,
    state: Arc<Mutex<FeedState>>,
    open: Arc<Mutex<HashMap<String, usize>>>,
}

#[async_trait]
impl ChangeSubscription for InMemorySubscription {
    async fn next_change(&mut self) -> Result<Option<ChangeOperation>> {
        match self.rx.recv().await {
            Some(Ok(op)) => Ok(Some(op)),
            Some(Err(message)) => Err(Error::Feed(message)),
            None => Ok(None),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        *self
            .state
            .lock()
            .closed
            .entry(self.collection.clone())
            .or_default() += 1;
        Ok(())
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        if let Some(count) = self.open.lock().get_mut(&self.collection) {
            *count = count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidings_core::Localized;

    #[tokio::test]
    async fn test_feed_emit_reaches_open_subscription() {
        let feed = InMemoryChangeFeed::new();
        let mut sub = feed.subscribe("article").await.unwrap();
        assert_eq!(feed.open_subscriptions("article"), 1);

        assert_eq!(feed.emit("article", ChangeOperation::Update), 1);
        assert_eq!(feed.emit("faq", ChangeOperation::Update), 0);
        assert_eq!(sub.next_change().await.unwrap(), Some(ChangeOperation::Update));

        sub.close().await.unwrap();
        assert_eq!(feed.open_subscriptions("article"), 0);
        assert_eq!(feed.closed_subscriptions("article"), 1);
    }

    #[tokio::test]
    async fn test_feed_failure_switch() {
        let feed = InMemoryChangeFeed::new();
        feed.set_failing("ticket", true);
        assert!(feed.subscribe("ticket").await.is_err());
        assert_eq!(feed.subscribe_calls("ticket"), 1);
        assert_eq!(feed.open_subscriptions("ticket"), 0);
    }

    #[tokio::test]
    async fn test_repository_lists_newest_first() {
        let repo = InMemoryNotificationRepository::new();
        let user = Uuid::new_v4();
        for title in ["a", "b", "c"] {
            let new = NewNotification::new(
                Localized::new(title.to_string(), String::new()),
                Localized::new(String::new(), String::new()),
            );
            repo.insert(user, &new).await.unwrap();
        }

        let titles: Vec<String> = repo
            .list(user, 2, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title.primary)
            .collect();
        assert_eq!(titles, vec!["c", "b"]);
    }
}
