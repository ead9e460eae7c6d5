//! Event fan-out to registered connections.
//!
//! An event is serialized once into an NDJSON frame and offered to every
//! handle under the target scope with a non-blocking `try_send`. A handle whose
//! buffer is full loses that one frame and stays registered; a handle whose
//! receiver is gone is unregistered. Delivery is at-most-once with no retry.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use tidings_core::{encode_frame, RawEvent, Result, Scope};

use crate::registry::ConnectionRegistry;

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handles found under the scope.
    pub attempted: usize,
    /// Handles that accepted the frame.
    pub delivered: usize,
    /// Handles that were too slow and skipped this frame.
    pub dropped: usize,
    /// Handles found closed and unregistered.
    pub removed: usize,
}

/// Serializes events and writes them to the connections of a scope.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    registry: Arc<ConnectionRegistry>,
}

impl EventPublisher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Publish `event` to every connection under `scope`.
    ///
    /// Fails only when the event cannot be serialized; per-connection write
    /// failures are reflected in the report.
    pub fn publish<E: Serialize + ?Sized>(&self, scope: Scope, event: &E) -> Result<PublishReport> {
        let frame = Bytes::from(encode_frame(event)?);
        Ok(self.publish_frame(scope, frame))
    }

    /// Broadcast a free-form `{"type": kind, "data": data}` frame.
    pub fn broadcast_raw(
        &self,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<PublishReport> {
        let event = RawEvent {
            kind: kind.into(),
            data,
        };
        self.publish(Scope::Broadcast, &event)
    }

    /// Write an already encoded frame to every connection under `scope`.
    pub fn publish_frame(&self, scope: Scope, frame: Bytes) -> PublishReport {
        let mut report = PublishReport::default();

        self.registry.for_each(scope, |handle| {
            report.attempted += 1;
            match handle.sender().try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(
                        subsystem = "realtime",
                        component = "publisher",
                        connection_id = handle.id(),
                        scope = %scope,
                        "Connection buffer full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.removed += 1;
                    // Other scopes keep the handle until its ConnectionGuard drops
                    self.registry.unregister(scope, handle.id());
                }
            }
        });

        debug!(
            subsystem = "realtime",
            component = "publisher",
            op = "publish",
            scope = %scope,
            attempted = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            removed = report.removed,
            "Event published"
        );
        report
    }
}
