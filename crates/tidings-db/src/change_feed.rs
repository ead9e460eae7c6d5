//! PostgreSQL change-capture feed built on `LISTEN/NOTIFY`.
//!
//! Each watched table carries row-level `AFTER INSERT OR UPDATE OR DELETE` and
//! statement-level `AFTER TRUNCATE` triggers that call
//! `tidings_notify_change()`. The function (see `migrations/`) sends
//! `{"op": <lowercased TG_OP>, "seq": <n>}` on channel `tidings_change_<table>`,
//! which a [`PgChangeSubscription`] receives through a dedicated [`PgListener`]
//! connection. The sequence number keeps payloads distinct so Postgres does
//! not fold several rows of one transaction into a single notification.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool};
use tracing::{debug, info, warn};

use tidings_core::defaults::CHANGE_CHANNEL_PREFIX;
use tidings_core::{
    validate_collection_name, ChangeFeedSource, ChangeOperation, ChangeSubscription, Error, Result,
};

const ROW_TRIGGER: &str = "tidings_change_feed";
const TRUNCATE_TRIGGER: &str = "tidings_change_feed_truncate";

/// `LISTEN` channel for a collection.
pub fn channel_name(collection: &str) -> String {
    format!("{}{}", CHANGE_CHANNEL_PREFIX, collection)
}

/// NOTIFY payload written by `tidings_notify_change()`.
#[derive(Debug, Deserialize)]
struct ChangePayload {
    op: String,
}

/// Decode a NOTIFY payload into the operation it reports.
pub fn parse_payload(payload: &str) -> Result<ChangeOperation> {
    let decoded: ChangePayload = serde_json::from_str(payload)?;
    decoded.op.parse()
}

/// Change feed source backed by a connection pool.
#[derive(Clone)]
pub struct PgChangeFeed {
    pool: PgPool,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Install (or reinstall) the change triggers on every collection table.
    ///
    /// Collections without a backing table are skipped with a warning; the
    /// names of the tables that received triggers are returned.
    pub async fn install_triggers(&self, collections: &[String]) -> Result<Vec<String>> {
        let mut installed = Vec::with_capacity(collections.len());
        for collection in collections {
            validate_collection_name(collection)?;

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables
                                WHERE table_schema = current_schema() AND table_name = $1)",
            )
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
            if !exists {
                warn!(
                    subsystem = "database",
                    component = "change_feed",
                    collection = %collection,
                    "Watched collection has no table, change triggers not installed"
                );
                continue;
            }

            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            for statement in trigger_statements(collection) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            }
            tx.commit().await.map_err(Error::Database)?;

            debug!(
                subsystem = "database",
                component = "change_feed",
                op = "install_triggers",
                collection = %collection,
                "Change triggers installed"
            );
            installed.push(collection.clone());
        }

        info!(
            subsystem = "database",
            component = "change_feed",
            installed = installed.len(),
            requested = collections.len(),
            "Change feed triggers ready"
        );
        Ok(installed)
    }
}

/// DDL that (re)creates the triggers for one validated collection name.
fn trigger_statements(collection: &str) -> [String; 4] {
    [
        format!(r#"DROP TRIGGER IF EXISTS {ROW_TRIGGER} ON "{collection}""#),
        format!(
            r#"CREATE TRIGGER {ROW_TRIGGER} AFTER INSERT OR UPDATE OR DELETE ON "{collection}"
               FOR EACH ROW EXECUTE FUNCTION tidings_notify_change()"#
        ),
        format!(r#"DROP TRIGGER IF EXISTS {TRUNCATE_TRIGGER} ON "{collection}""#),
        format!(
            r#"CREATE TRIGGER {TRUNCATE_TRIGGER} AFTER TRUNCATE ON "{collection}"
               FOR EACH STATEMENT EXECUTE FUNCTION tidings_notify_change()"#
        ),
    ]
}

#[async_trait]
impl ChangeFeedSource for PgChangeFeed {
    async fn subscribe(&self, collection: &str) -> Result<Box<dyn ChangeSubscription>> {
        validate_collection_name(collection)?;

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| Error::Feed(format!("listener connect failed: {}", e)))?;
        let channel = channel_name(collection);
        listener
            .listen(&channel)
            .await
            .map_err(|e| Error::Feed(format!("LISTEN {} failed: {}", channel, e)))?;

        debug!(
            subsystem = "database",
            component = "change_feed",
            op = "subscribe",
            collection = %collection,
            channel = %channel,
            "Listening for changes"
        );

        Ok(Box::new(PgChangeSubscription {
            listener,
            collection: collection.to_string(),
        }))
    }
}

/// One `LISTEN` connection for one collection.
///
/// [`PgListener`] re-establishes a dropped connection inside `recv`;
/// notifications sent while it was down are lost, which matches best-effort
/// delivery. Only a failed reconnect surfaces as an error.
pub struct PgChangeSubscription {
    listener: PgListener,
    collection: String,
}

#[async_trait]
impl ChangeSubscription for PgChangeSubscription {
    async fn next_change(&mut self) -> Result<Option<ChangeOperation>> {
        loop {
            let notification = self
                .listener
                .recv()
                .await
                .map_err(|e| Error::Feed(format!("{}: {}", self.collection, e)))?;

            match parse_payload(notification.payload()) {
                Ok(operation) => return Ok(Some(operation)),
                Err(e) => {
                    warn!(
                        subsystem = "database",
                        component = "change_feed",
                        collection = %self.collection,
                        payload = notification.payload(),
                        error = %e,
                        "Skipping unrecognized change payload"
                    );
                }
            }
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.listener.unlisten_all().await.map_err(Error::Database)?;
        debug!(
            subsystem = "database",
            component = "change_feed",
            op = "close",
            collection = %self.collection,
            "Change subscription closed"
        );
        Ok(())
    }
}
