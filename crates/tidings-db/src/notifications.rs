//! Notification repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use tidings_core::{
    Error, Localized, NewNotification, Notification, NotificationKind, NotificationRepository,
    RelatedEntity, Result,
};

const SELECT_COLUMNS: &str = "id, user_id, title, title_alt, message, message_alt, kind, is_read,
        related_id, related_kind, action_url, created_at, updated_at";

/// PostgreSQL notification repository.
#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> Notification {
        let related_id: Option<String> = r.get("related_id");
        let related_kind: Option<String> = r.get("related_kind");
        let kind: String = r.get("kind");
        Notification {
            id: r.get("id"),
            user_id: r.get("user_id"),
            title: Localized::new(r.get("title"), r.get("title_alt")),
            message: Localized::new(r.get("message"), r.get("message_alt")),
            kind: kind.parse().unwrap_or(NotificationKind::Info),
            is_read: r.get("is_read"),
            related: match (related_id, related_kind) {
                (Some(id), Some(kind)) => Some(RelatedEntity { id, kind }),
                _ => None,
            },
            action_url: r.get("action_url"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, user_id: Uuid, new: &NewNotification) -> Result<Notification> {
        let id = tidings_core::new_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO notification (id, user_id, title, title_alt, message, message_alt, kind,
                                       is_read, related_id, related_kind, action_url,
                                       created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8, $9, $10, $11, $11)",
        )
        .bind(id)
        .bind(user_id)
        .bind(&new.title.primary)
        .bind(&new.title.alternate)
        .bind(&new.message.primary)
        .bind(&new.message.alternate)
        .bind(new.kind.as_str())
        .bind(new.related.as_ref().map(|r| r.id.as_str()))
        .bind(new.related.as_ref().map(|r| r.kind.as_str()))
        .bind(new.action_url.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notifications",
            op = "insert",
            notification_id = %id,
            user_id = %user_id,
            "Notification persisted"
        );

        Ok(Notification {
            id,
            user_id,
            title: new.title.clone(),
            message: new.message.clone(),
            kind: new.kind,
            is_read: false,
            related: new.related.clone(),
            action_url: new.action_url.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn list(&self, user_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM notification
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notification SET is_read = true, updated_at = now()
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notification SET is_read = true, updated_at = now()
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notification WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
