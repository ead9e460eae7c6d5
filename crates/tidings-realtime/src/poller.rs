//! Polling fallback for content without a change feed (comment threads).
//!
//! A [`TopicPoller`] re-reads the newest item timestamp of one topic on a fixed
//! interval and emits `update` only when it advances past the last value seen.
//! The first successful poll only records the baseline.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use tidings_core::defaults::POLL_INTERVAL_MS;
use tidings_core::{encode_frame, StreamEvent, Topic, TopicActivitySource};

/// Message sent to the client when a poll query fails.
pub const POLL_ERROR_MESSAGE: &str = "failed to load updates";

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}

impl PollConfig {
    /// Reads `POLL_INTERVAL_MS` (default `3000`).
    pub fn from_env() -> Self {
        let ms = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(POLL_INTERVAL_MS)
            .max(1);
        Self {
            interval: Duration::from_millis(ms),
        }
    }
}

/// Change detector for one topic.
pub struct TopicPoller {
    source: Arc<dyn TopicActivitySource>,
    topic: Topic,
    /// `None` until a poll succeeds; then the newest timestamp seen, which is
    /// itself `None` while the topic has no items.
    baseline: Option<Option<DateTime<Utc>>>,
}

impl TopicPoller {
    pub fn new(source: Arc<dyn TopicActivitySource>, topic: Topic) -> Self {
        Self {
            source,
            topic,
            baseline: None,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Run one poll and return the event to send, if any.
    pub async fn poll_once(&mut self) -> Option<StreamEvent> {
        let latest = match self.source.latest_activity(&self.topic).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(
                    subsystem = "realtime",
                    component = "poller",
                    topic = %self.topic,
                    error = %e,
                    "Topic poll failed"
                );
                return Some(StreamEvent::Error {
                    message: POLL_ERROR_MESSAGE.to_string(),
                });
            }
        };

        match self.baseline {
            None => {
                self.baseline = Some(latest);
                None
            }
            // `None < Some(_)`: the first item of an empty topic is an advance
            Some(previous) if latest > previous => {
                self.baseline = Some(latest);
                Some(StreamEvent::Update { latest_at: latest })
            }
            Some(_) => None,
        }
    }

    /// Poll until cancelled or the connection goes away, writing frames to `sink`.
    #[instrument(skip_all, fields(subsystem = "realtime", component = "poller", topic = %self.topic))]
    pub async fn run(
        mut self,
        config: PollConfig,
        sink: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_ms = config.interval.as_millis() as u64, "Polling started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sink.closed() => break,
                _ = ticker.tick() => {}
            }

            let Some(event) = self.poll_once().await else {
                continue;
            };
            let frame = match encode_frame(&event) {
                Ok(frame) => Bytes::from(frame),
                Err(e) => {
                    warn!(error = %e, "Failed to encode poll event");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        debug!("Polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTopicActivity;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, hour, 0, 0).unwrap()
    }

    fn poller() -> (Arc<InMemoryTopicActivity>, Topic, TopicPoller) {
        let source = Arc::new(InMemoryTopicActivity::new());
        let topic = Topic::new("article", Uuid::new_v4());
        let poller = TopicPoller::new(source.clone(), topic.clone());
        (source, topic, poller)
    }

    #[tokio::test]
    async fn test_baseline_then_exactly_one_update() {
        let (source, topic, mut poller) = poller();
        source.set_latest(&topic, at(9));

        assert_eq!(poller.poll_once().await, None);
        assert_eq!(poller.poll_once().await, None);

        source.set_latest(&topic, at(10));
        assert_eq!(
            poller.poll_once().await,
            Some(StreamEvent::Update {
                latest_at: Some(at(10))
            })
        );
        assert_eq!(poller.poll_once().await, None);
    }

    #[tokio::test]
    async fn test_first_item_of_empty_topic_is_update() {
        let (source, topic, mut poller) = poller();

        assert_eq!(poller.poll_once().await, None);
        source.set_latest(&topic, at(8));
        assert!(matches!(
            poller.poll_once().await,
            Some(StreamEvent::Update { .. })
        ));
    }

    #[tokio::test]
    async fn test_error_is_reported_and_polling_continues() {
        let (source, topic, mut poller) = poller();
        source.set_latest(&topic, at(9));
        poller.poll_once().await;

        source.set_failing(true);
        assert_eq!(
            poller.poll_once().await,
            Some(StreamEvent::Error {
                message: POLL_ERROR_MESSAGE.to_string()
            })
        );

        source.set_failing(false);
        source.set_latest(&topic, at(11));
        assert!(matches!(
            poller.poll_once().await,
            Some(StreamEvent::Update { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_first_poll_sets_no_baseline() {
        let (source, topic, mut poller) = poller();
        source.set_latest(&topic, at(9));
        source.set_failing(true);
        assert!(matches!(
            poller.poll_once().await,
            Some(StreamEvent::Error { .. })
        ));

        source.set_failing(false);
        assert_eq!(poller.poll_once().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_update_frame_and_stops_on_cancel() {
        let (source, topic, poller) = poller();
        source.set_latest(&topic, at(9));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let config = PollConfig {
            interval: Duration::from_millis(100),
        };

        let task = tokio::spawn(poller.run(config, tx, cancel.clone()));

        // Let the baseline poll happen before the timestamp moves
        while source.query_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        source.set_latest(&topic, at(12));

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["latestAt"], "2026-10-01T12:00:00Z");

        cancel.cancel();
        task.await.unwrap();
    }
}
