//! Notification service: persists per-user notifications and pushes each new
//! record to the owner's open connections.
//!
//! Persistence always happens first; a failed or undelivered push never rolls
//! the record back. Clients that were offline read it from [`list`].
//!
//! [`list`]: NotificationService::list

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tidings_core::defaults::{NOTIFICATION_PAGE_MAX, NOTIFICATION_PAGE_SIZE};
use tidings_core::{
    Error, LocaleConfig, NewNotification, Notification, NotificationRepository, NotificationView,
    Result, Scope, StreamEvent, UserDirectory,
};

use crate::publisher::EventPublisher;

/// Paging limits for notification listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            default_limit: NOTIFICATION_PAGE_SIZE,
            max_limit: NOTIFICATION_PAGE_MAX,
        }
    }
}

impl PageConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `NOTIFICATION_PAGE_SIZE` | `20` |
    /// | `NOTIFICATION_PAGE_MAX` | `100` |
    pub fn from_env() -> Self {
        let read = |key: &str, default: i64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };
        let max_limit = read("NOTIFICATION_PAGE_MAX", NOTIFICATION_PAGE_MAX).max(1);
        let default_limit = read("NOTIFICATION_PAGE_SIZE", NOTIFICATION_PAGE_SIZE).clamp(1, max_limit);
        Self {
            default_limit,
            max_limit,
        }
    }

    /// Resolve a requested page size: missing means default, anything else is
    /// clamped to `[1, max_limit]`.
    pub fn limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Result of a listing: the page plus the caller's total unread count.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationView>,
    pub unread_count: i64,
}

/// Creates, pushes, and manages per-user notifications.
#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserDirectory>,
    publisher: EventPublisher,
    locales: LocaleConfig,
    pages: PageConfig,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserDirectory>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            repo,
            users,
            publisher,
            locales: LocaleConfig::default(),
            pages: PageConfig::default(),
        }
    }

    pub fn with_locales(mut self, locales: LocaleConfig) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_pages(mut self, pages: PageConfig) -> Self {
        self.pages = pages;
        self
    }

    pub fn locales(&self) -> &LocaleConfig {
        &self.locales
    }

    /// Persist a notification for `user_id` and push it to the user's
    /// connections.
    #[instrument(skip(self, new), fields(subsystem = "realtime", component = "notifications", op = "notify"))]
    pub async fn notify(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification> {
        new.validate()?;
        let notification = self.repo.insert(user_id, new).await?;
        self.push(&notification);
        Ok(notification)
    }

    /// Notify every active user, one after another. Per-user failures are
    /// logged and skipped; returns the number of notifications created.
    #[instrument(skip(self, new), fields(subsystem = "realtime", component = "notifications", op = "notify_all"))]
    pub async fn notify_all(&self, new: &NewNotification) -> Result<usize> {
        new.validate()?;
        let start = Instant::now();
        let users = self.users.active_user_ids().await?;

        let mut created = 0;
        for user_id in &users {
            match self.repo.insert(*user_id, new).await {
                Ok(notification) => {
                    self.push(&notification);
                    created += 1;
                }
                Err(e) => warn!(
                    user_id = %user_id,
                    error = %e,
                    "Failed to create notification for user"
                ),
            }
        }

        info!(
            attempted = users.len(),
            created,
            duration_ms = start.elapsed().as_millis() as u64,
            "Notification fan-out complete"
        );
        Ok(created)
    }

    /// Mark one notification read. False when it does not exist or belongs to
    /// someone else.
    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.repo.mark_read(id, user_id).await
    }

    /// Mark every unread notification of `user_id` read; returns how many flipped.
    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64> {
        let flipped = self.repo.mark_all_read(user_id).await?;
        debug!(
            subsystem = "realtime",
            component = "notifications",
            op = "mark_all_as_read",
            user_id = %user_id,
            flipped,
            "Notifications marked read"
        );
        Ok(flipped)
    }

    /// Delete one notification, with the same ownership rule as
    /// [`mark_as_read`](Self::mark_as_read).
    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.repo.delete(id, user_id).await
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.repo.unread_count(user_id).await
    }

    /// Newest-first page of a user's notifications resolved to `locale`.
    pub async fn list(
        &self,
        user_id: Uuid,
        locale: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<NotificationPage> {
        let lang = self.locales.lang_for(locale);
        let limit = self.pages.limit(limit);
        let offset = offset.unwrap_or(0).max(0);

        let rows = self.repo.list(user_id, limit, offset).await?;
        let unread_count = self.repo.unread_count(user_id).await?;

        Ok(NotificationPage {
            notifications: rows.iter().map(|n| n.resolve(lang)).collect(),
            unread_count,
        })
    }

    /// Delete-or-404 helper for callers that want an error rather than a flag.
    pub async fn delete_owned(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        if self.delete(id, user_id).await? {
            Ok(())
        } else {
            Err(Error::NotificationNotFound(id))
        }
    }

    fn push(&self, notification: &Notification) {
        let event = StreamEvent::Notification {
            data: notification.clone(),
        };
        match self
            .publisher
            .publish(Scope::User(notification.user_id), &event)
        {
            Ok(report) => debug!(
                notification_id = %notification.id,
                delivered = report.delivered,
                "Notification pushed"
            ),
            Err(e) => warn!(
                notification_id = %notification.id,
                error = %e,
                "Failed to push notification"
            ),
        }
    }
}
