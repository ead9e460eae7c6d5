//! Read-only access to the user table maintained by the CRUD layer.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use tidings_core::{Error, Result, UserDirectory};

/// PostgreSQL user directory.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool<Postgres>,
}

impl PgUserDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn active_user_ids(&self) -> Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT id FROM app_user WHERE is_active = true ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
