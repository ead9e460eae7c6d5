//! Structured logging field name constants for tidings.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation tools can query by the same field names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention (e.g. a watcher entered `Errored`) |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown, connection open/close) |
//! | DEBUG | Decision points, per-publish fan-out summaries |
//! | TRACE | Per-handle delivery |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "realtime", "database"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "registry", "publisher", "watcher", "notifications", "poller", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "publish", "subscribe", "notify", "mark_read"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Connection identifier allocated by the registry.
pub const CONNECTION_ID: &str = "connection_id";

/// Delivery scope ("*" or a user id).
pub const SCOPE: &str = "scope";

/// User UUID a notification or connection belongs to.
pub const USER_ID: &str = "user_id";

/// Notification UUID being operated on.
pub const NOTIFICATION_ID: &str = "notification_id";

/// Watched collection name.
pub const COLLECTION: &str = "collection";

/// Polled topic ("<kind>/<id>").
pub const TOPIC: &str = "topic";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of handles a publish attempted.
pub const ATTEMPTED: &str = "attempted";

/// Number of handles a publish reached.
pub const DELIVERED: &str = "delivered";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
