//! Centralized default constants for tidings.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration loaders fall back to these when an environment variable is
//! unset or unparsable.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP listen port.
pub const SERVER_PORT: u16 = 3000;

/// Default HTTP listen host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default database URL for local development.
pub const DATABASE_URL: &str = "postgres://localhost/tidings";

// =============================================================================
// STREAMING
// =============================================================================

/// Per-connection outbound frame buffer. A connection whose buffer is full
/// misses the frame being published (best-effort delivery).
pub const STREAM_BUFFER_CAPACITY: usize = 256;

/// Interval between keepalive lines on an idle stream.
pub const STREAM_HEARTBEAT_SECS: u64 = 15;

/// Scope key clients and collaborators use for "every connected client".
pub const BROADCAST_SCOPE_KEY: &str = "*";

// =============================================================================
// CHANGE FEED
// =============================================================================

/// Collections watched when `WATCHED_COLLECTIONS` is unset.
pub const WATCHED_COLLECTIONS: &[&str] = &[
    "article", "episode", "faq", "ticket", "app_user", "setting", "message", "favorite",
];

/// Prefix of the `LISTEN` channel a collection's trigger notifies on.
pub const CHANGE_CHANNEL_PREFIX: &str = "tidings_change_";

/// First reconnect delay when watcher reconnect is enabled.
pub const WATCHER_RECONNECT_INITIAL_MS: u64 = 1_000;

/// Reconnect delay ceiling when watcher reconnect is enabled.
pub const WATCHER_RECONNECT_MAX_MS: u64 = 60_000;

// =============================================================================
// POLLING FALLBACK
// =============================================================================

/// Interval between "latest item" queries on a polled topic.
pub const POLL_INTERVAL_MS: u64 = 3_000;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Default notification list page size.
pub const NOTIFICATION_PAGE_SIZE: i64 = 20;

/// Largest page a single list call may request.
pub const NOTIFICATION_PAGE_MAX: i64 = 100;

/// Locale code resolved to the primary text of a [`crate::Localized`] value.
pub const PRIMARY_LOCALE: &str = "en";

/// Locale code resolved to the alternate text of a [`crate::Localized`] value.
pub const ALTERNATE_LOCALE: &str = "ar";
