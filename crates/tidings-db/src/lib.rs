//! # tidings-db
//!
//! PostgreSQL storage layer for tidings.
//!
//! This crate provides:
//! - Connection pool management
//! - The notification repository
//! - Read-only views of collaborator tables (users, comments)
//! - The `LISTEN/NOTIFY` change-capture feed and its trigger installer
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidings_db::Database;
//! use tidings_core::{Localized, NewNotification, NotificationRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tidings").await?;
//!
//!     let created = db.notifications.insert(
//!         user_id,
//!         &NewNotification::new(
//!             Localized::new("Ticket answered".into(), "تم الرد على التذكرة".into()),
//!             Localized::new("Open it to read the reply".into(), "".into()),
//!         ),
//!     ).await?;
//!
//!     println!("Created notification: {}", created.id);
//!     Ok(())
//! }
//! ```
pub mod change_feed;
pub mod comments;
pub mod notifications;
pub mod pool;
pub mod users;

// Test fixtures for integration tests
pub mod test_fixtures;

// Re-export core types
pub use tidings_core::*;

pub use change_feed::{channel_name, parse_payload, PgChangeFeed, PgChangeSubscription};
pub use comments::PgCommentActivity;
pub use notifications::PgNotificationRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use users::PgUserDirectory;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Notification persistence.
    pub notifications: PgNotificationRepository,
    /// Active user lookup for fan-out.
    pub users: PgUserDirectory,
    /// Comment activity for the polling fallback.
    pub comments: PgCommentActivity,
    /// Change-capture feed for watched collections.
    pub change_feed: PgChangeFeed,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notifications: PgNotificationRepository::new(pool.clone()),
            users: PgUserDirectory::new(pool.clone()),
            comments: PgCommentActivity::new(pool.clone()),
            change_feed: PgChangeFeed::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
