//! Router harness backed by in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::{Request, Response};
use axum::Router;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use tidings_api::{build_router, AppState, StreamConfig};
use tidings_realtime::memory::{
    InMemoryChangeFeed, InMemoryNotificationRepository, InMemoryTopicActivity,
    InMemoryUserDirectory,
};
use tidings_realtime::{
    ConnectionRegistry, EventPublisher, NotificationService, PollConfig, WatcherConfig,
    WatcherLifetime, WatcherSupervisor,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub feed: InMemoryChangeFeed,
    pub repo: Arc<InMemoryNotificationRepository>,
    pub topics: Arc<InMemoryTopicActivity>,
    pub users: Vec<Uuid>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_lifetime(WatcherLifetime::Process)
    }

    pub fn with_lifetime(lifetime: WatcherLifetime) -> Self {
        let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let feed = InMemoryChangeFeed::new();
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let topics = Arc::new(InMemoryTopicActivity::new());

        let shutdown = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let publisher = EventPublisher::new(registry.clone());
        let supervisor = WatcherSupervisor::new(
            Arc::new(feed.clone()),
            publisher.clone(),
            WatcherConfig::default()
                .with_collections(["article", "ticket"])
                .with_lifetime(lifetime),
            shutdown.clone(),
        );
        let notifications = NotificationService::new(
            repo.clone(),
            Arc::new(InMemoryUserDirectory::new(users.clone())),
            publisher.clone(),
        );

        let state = AppState {
            registry,
            publisher,
            supervisor,
            notifications,
            topics: topics.clone(),
            stream: StreamConfig {
                buffer_capacity: 16,
                heartbeat: Duration::from_secs(60),
            },
            poll: PollConfig {
                interval: Duration::from_millis(20),
            },
            shutdown,
        };

        Self {
            router: build_router(state.clone()),
            state,
            feed,
            repo,
            topics,
            users,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Reads NDJSON frames off a streaming body, skipping heartbeat lines.
pub struct FrameReader {
    stream: BodyDataStream,
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new(response: Response<Body>) -> Self {
        Self {
            stream: response.into_body().into_data_stream(),
            buffer: Vec::new(),
        }
    }

    pub async fn next_frame(&mut self) -> serde_json::Value {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if line.len() > 1 {
                    return serde_json::from_slice(&line[..line.len() - 1]).unwrap();
                }
                continue;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("frame within timeout")
                .expect("stream still open")
                .unwrap();
            self.buffer.extend_from_slice(&chunk);
        }
    }
}
