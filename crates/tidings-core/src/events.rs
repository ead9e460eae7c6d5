//! Stream event types and the newline-delimited JSON frame format.
//!
//! Every frame written to a stream connection is one JSON object terminated by
//! `\n`, tagged with a `type` field:
//!
//! ```text
//! {"type":"connected"}
//! {"type":"change","collection":"article","operation":"update"}
//! {"type":"notification","data":{"id":"...","userId":"...",...}}
//! {"type":"update","latestAt":"2026-10-17T09:30:00Z"}
//! {"type":"error","message":"failed to load comments"}
//! ```
//!
//! Collaborators may also broadcast ad-hoc frames (`{"type": "...", "data": ...}`)
//! through [`RawEvent`] for content types without a dedicated change feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ChangeOperation, Notification};

// ============================================================================
// Stream Event (wire payloads)
// ============================================================================

/// Event written to stream and polling connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Handshake sent once when a stream opens.
    Connected,
    /// A watched collection was mutated. Always broadcast.
    Change {
        collection: String,
        operation: ChangeOperation,
    },
    /// A notification was created for the receiving user. Never broadcast.
    Notification { data: Notification },
    /// A polled topic has new items.
    Update {
        #[serde(
            rename = "latestAt",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        latest_at: Option<DateTime<Utc>>,
    },
    /// A polled query failed; the connection stays open.
    Error { message: String },
}

impl StreamEvent {
    /// The `type` tag written on the wire.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Connected => "connected",
            StreamEvent::Change { .. } => "change",
            StreamEvent::Notification { .. } => "notification",
            StreamEvent::Update { .. } => "update",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn change(collection: impl Into<String>, operation: ChangeOperation) -> Self {
        StreamEvent::Change {
            collection: collection.into(),
            operation,
        }
    }
}

/// Free-form broadcast frame: `{"type": kind, "data": data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ============================================================================
// Frame encoding
// ============================================================================

/// Serialize an event into a single NDJSON frame (JSON plus trailing newline).
pub fn encode_frame<E: Serialize + ?Sized>(event: &E) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(event)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Keepalive line written on idle streams. NDJSON readers skip blank lines.
pub const HEARTBEAT_FRAME: &[u8] = b"\n";

// ============================================================================
// Tests
// ============================================================================
