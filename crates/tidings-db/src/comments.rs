//! Comment activity lookups for the polling fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use tidings_core::{Error, Result, Topic, TopicActivitySource};

/// Reads the newest comment timestamp of a thread.
#[derive(Clone)]
pub struct PgCommentActivity {
    pool: Pool<Postgres>,
}

impl PgCommentActivity {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TopicActivitySource for PgCommentActivity {
    async fn latest_activity(&self, topic: &Topic) -> Result<Option<DateTime<Utc>>> {
        // MAX over an empty set yields a single NULL row
        sqlx::query_scalar(
            "SELECT MAX(created_at) FROM comment WHERE topic_kind = $1 AND topic_id = $2",
        )
        .bind(&topic.kind)
        .bind(topic.id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
