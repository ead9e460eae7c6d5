//! Change-feed watchers: one long-lived subscription per watched collection,
//! translated into broadcast `change` events.
//!
//! [`WatcherSupervisor`] owns every watcher and guarantees at most one active
//! watcher per collection, however many stream connections ask for it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use tidings_core::defaults::{
    WATCHED_COLLECTIONS, WATCHER_RECONNECT_INITIAL_MS, WATCHER_RECONNECT_MAX_MS,
};
use tidings_core::{
    validate_collection_name, ChangeFeedSource, ChangeSubscription, Error, Result, Scope,
    StreamEvent,
};

use crate::publisher::EventPublisher;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Lifecycle of one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Watching,
    Stopped,
    Errored,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Starting => "starting",
            WatcherState::Watching => "watching",
            WatcherState::Stopped => "stopped",
            WatcherState::Errored => "errored",
        }
    }

    /// Whether a watcher in this state occupies its collection slot.
    fn is_active(&self) -> bool {
        !matches!(self, WatcherState::Stopped)
    }
}

/// When watchers run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatcherLifetime {
    /// Started once at process start, stopped at shutdown.
    #[default]
    Process,
    /// Started by the first stream connection, stopped when the last one closes.
    OnDemand,
}

impl FromStr for WatcherLifetime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(WatcherLifetime::Process),
            "on_demand" | "on-demand" | "ondemand" => Ok(WatcherLifetime::OnDemand),
            other => Err(Error::Config(format!("unknown watcher lifetime: {}", other))),
        }
    }
}

/// Exponential backoff for re-subscribing after a feed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(WATCHER_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(WATCHER_RECONNECT_MAX_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based): doubles each time,
    /// capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Configuration for the watcher supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Collections to watch.
    pub collections: Vec<String>,
    pub lifetime: WatcherLifetime,
    /// Re-subscribe after failures; `None` leaves a failed watcher Errored.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            collections: WATCHED_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            lifetime: WatcherLifetime::Process,
            reconnect: None,
        }
    }
}

impl WatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WATCHED_COLLECTIONS` | see `defaults` | Comma-separated collection names |
    /// | `WATCHER_LIFETIME` | `process` | `process` or `on_demand` |
    /// | `WATCHER_RECONNECT` | `false` | Re-subscribe after feed failures |
    /// | `WATCHER_RECONNECT_INITIAL_MS` | `1000` | First backoff delay |
    /// | `WATCHER_RECONNECT_MAX_MS` | `60000` | Backoff cap |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(list) = lookup("WATCHED_COLLECTIONS") {
            config.collections = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(lifetime) = lookup("WATCHER_LIFETIME") {
            config.lifetime = lifetime.parse()?;
        }

        let reconnect = lookup("WATCHER_RECONNECT")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        if reconnect {
            let ms = |key: &str, default: u64| {
                lookup(key)
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(default)
            };
            let initial = ms("WATCHER_RECONNECT_INITIAL_MS", WATCHER_RECONNECT_INITIAL_MS).max(1);
            let max = ms("WATCHER_RECONNECT_MAX_MS", WATCHER_RECONNECT_MAX_MS).max(initial);
            config.reconnect = Some(ReconnectPolicy {
                initial: Duration::from_millis(initial),
                max: Duration::from_millis(max),
            });
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lifetime(mut self, lifetime: WatcherLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Reject invalid or duplicate collection names.
    pub fn validate(&self) -> Result<()> {
        for (i, collection) in self.collections.iter().enumerate() {
            validate_collection_name(collection)?;
            if self.collections[..i].contains(collection) {
                return Err(Error::Config(format!(
                    "collection '{}' listed twice",
                    collection
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// WATCHER
// =============================================================================

enum PumpExit {
    Cancelled,
    Ended,
    Failed(Error),
}

/// Translates one collection's change feed into broadcast events.
struct ChangeFeedWatcher {
    collection: String,
    source: Arc<dyn ChangeFeedSource>,
    publisher: EventPublisher,
    state: Arc<watch::Sender<WatcherState>>,
    cancel: CancellationToken,
    reconnect: Option<ReconnectPolicy>,
}

impl ChangeFeedWatcher {
    /// Record a transition unless the watcher was cancelled, in which case only
    /// `Stopped` may be written. Checked under the channel lock so a concurrent
    /// stop cannot be overwritten.
    fn set_state(&self, next: WatcherState) {
        let cancel = &self.cancel;
        self.state.send_if_modified(|current| {
            if *current == next || (cancel.is_cancelled() && next != WatcherState::Stopped) {
                return false;
            }
            *current = next;
            true
        });
    }

    #[instrument(skip(self), fields(subsystem = "realtime", component = "watcher", collection = %self.collection))]
    async fn run(self) {
        let mut attempt: u32 = 0;
        loop {
            self.set_state(WatcherState::Starting);

            let subscribed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.set_state(WatcherState::Stopped);
                    return;
                }
                result = self.source.subscribe(&self.collection) => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    attempt = 0;
                    self.set_state(WatcherState::Watching);
                    info!(op = "watch", "Change feed subscription open");

                    let exit = self.pump(subscription.as_mut()).await;
                    if let Err(e) = subscription.close().await {
                        warn!(error = %e, "Failed to close change feed subscription");
                    }

                    match exit {
                        PumpExit::Cancelled => {
                            self.set_state(WatcherState::Stopped);
                            info!(op = "stop", "Change watcher stopped");
                            return;
                        }
                        PumpExit::Ended => {
                            error!("Change feed ended unexpectedly");
                        }
                        PumpExit::Failed(e) => {
                            error!(error = %e, "Change feed subscription failed");
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to open change feed subscription");
                }
            }

            self.set_state(WatcherState::Errored);

            let Some(policy) = self.reconnect else {
                return;
            };
            let delay = policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(
                delay_ms = delay.as_millis() as u64,
                attempt, "Reconnecting change feed after backoff"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.set_state(WatcherState::Stopped);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&self, subscription: &mut dyn ChangeSubscription) -> PumpExit {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PumpExit::Cancelled,
                next = subscription.next_change() => next,
            };

            match next {
                Ok(Some(operation)) => {
                    let event = StreamEvent::change(self.collection.as_str(), operation);
                    match self.publisher.publish(Scope::Broadcast, &event) {
                        Ok(report) => debug!(
                            operation = %operation,
                            delivered = report.delivered,
                            "Change broadcast"
                        ),
                        Err(e) => warn!(
                            operation = %operation,
                            error = %e,
                            "Failed to broadcast change"
                        ),
                    }
                }
                Ok(None) => return PumpExit::Ended,
                Err(e) => return PumpExit::Failed(e),
            }
        }
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

struct WatcherHandle {
    state: Arc<watch::Sender<WatcherState>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Cancel the watcher and hand back its task. The slot reads `Stopped`
    /// immediately so the collection can be started again.
    fn detach(&mut self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.state.send_replace(WatcherState::Stopped);
        self.task.take()
    }
}

#[derive(Debug, Clone, Copy)]
enum Start {
    /// Explicit request; clears an operator hold.
    Resume,
    /// Bulk start; leaves held collections stopped.
    UnlessHeld,
}

struct SupervisorInner {
    source: Arc<dyn ChangeFeedSource>,
    publisher: EventPublisher,
    config: WatcherConfig,
    shutdown: CancellationToken,
    watchers: Mutex<HashMap<String, WatcherHandle>>,
    /// Collections stopped by an operator; `start_all` and leases skip them.
    held: Mutex<HashSet<String>>,
    /// Tasks of detached watchers that may still be closing their subscription.
    retiring: Mutex<Vec<JoinHandle<()>>>,
    leases: Mutex<usize>,
}

/// Owns every change-feed watcher. Cheap to clone.
#[derive(Clone)]
pub struct WatcherSupervisor {
    inner: Arc<SupervisorInner>,
}

impl WatcherSupervisor {
    /// Create a supervisor. `shutdown` is the process-wide token; every watcher
    /// runs under a child of it.
    pub fn new(
        source: Arc<dyn ChangeFeedSource>,
        publisher: EventPublisher,
        config: WatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                source,
                publisher,
                config,
                shutdown,
                watchers: Mutex::new(HashMap::new()),
                held: Mutex::new(HashSet::new()),
                retiring: Mutex::new(Vec::new()),
                leases: Mutex::new(0),
            }),
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    /// Start a watcher for every configured collection (Process lifetime).
    pub fn start_all(&self) {
        self.inner.start_all();
    }

    /// Start the watcher for `collection` unless one is already Starting,
    /// Watching, or Errored. Lifts a hold left by [`stop`](Self::stop).
    pub fn ensure_started(&self, collection: &str) -> Result<()> {
        self.inner.ensure_started(collection, Start::Resume)
    }

    /// Stop the watcher for `collection` and wait until its subscription is
    /// closed. Returns whether a running watcher was found.
    ///
    /// The collection stays stopped until [`ensure_started`](Self::ensure_started)
    /// or [`restart`](Self::restart): `start_all` and new leases skip it.
    pub async fn stop(&self, collection: &str) -> bool {
        let task = {
            let mut watchers = self.inner.watchers.lock();
            if self.inner.check_configured(collection).is_ok() {
                self.inner.held.lock().insert(collection.to_string());
            }
            let Some(handle) = watchers.get_mut(collection) else {
                return false;
            };
            let active = handle.state.borrow().is_active();
            if !active && handle.task.is_none() {
                return false;
            }
            handle.detach()
        };
        if let Some(task) = task {
            join_watcher(collection, task).await;
        }
        true
    }

    /// Stop and start `collection` again. The way out of `Errored` when
    /// reconnecting is disabled.
    pub async fn restart(&self, collection: &str) -> Result<()> {
        self.inner.check_configured(collection)?;
        self.stop(collection).await;
        info!(
            subsystem = "realtime",
            component = "supervisor",
            op = "restart",
            collection = %collection,
            "Restarting change watcher"
        );
        self.ensure_started(collection)
    }

    /// Current state of every configured collection.
    pub fn states(&self) -> BTreeMap<String, WatcherState> {
        let watchers = self.inner.watchers.lock();
        self.inner
            .config
            .collections
            .iter()
            .map(|c| {
                let state = watchers
                    .get(c)
                    .map_or(WatcherState::Stopped, |h| *h.state.borrow());
                (c.clone(), state)
            })
            .collect()
    }

    /// Observe state changes of `collection`'s current watcher.
    pub fn watch_state(&self, collection: &str) -> Option<watch::Receiver<WatcherState>> {
        self.inner
            .watchers
            .lock()
            .get(collection)
            .map(|h| h.state.subscribe())
    }

    /// Hold watchers up for the lifetime of a stream connection.
    ///
    /// Every lease makes sure the configured watchers exist. Under
    /// [`WatcherLifetime::OnDemand`] dropping the last lease stops them.
    pub fn acquire(&self) -> WatcherLease {
        let mut leases = self.inner.leases.lock();
        *leases += 1;
        self.inner.start_all();
        WatcherLease {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        *self.inner.leases.lock()
    }

    /// Cancel every watcher and wait until all subscriptions are closed.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let mut tasks: Vec<(String, JoinHandle<()>)> = {
            let mut watchers = self.inner.watchers.lock();
            watchers
                .iter_mut()
                .filter_map(|(c, h)| h.detach().map(|t| (c.clone(), t)))
                .collect()
        };
        tasks.extend(
            self.inner
                .retiring
                .lock()
                .drain(..)
                .map(|t| ("retired".to_string(), t)),
        );

        let count = tasks.len();
        for (collection, task) in tasks {
            join_watcher(&collection, task).await;
        }
        info!(
            subsystem = "realtime",
            component = "supervisor",
            op = "shutdown",
            watchers = count,
            "Change watchers shut down"
        );
    }
}

impl SupervisorInner {
    fn check_configured(&self, collection: &str) -> Result<()> {
        if self.config.collections.iter().any(|c| c == collection) {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "collection '{}' is not watched",
                collection
            )))
        }
    }

    fn start_all(&self) {
        for collection in &self.config.collections {
            if let Err(e) = self.ensure_started(collection, Start::UnlessHeld) {
                warn!(
                    subsystem = "realtime",
                    component = "supervisor",
                    collection = %collection,
                    error = %e,
                    "Failed to start change watcher"
                );
            }
        }
    }

    fn ensure_started(&self, collection: &str, start: Start) -> Result<()> {
        self.check_configured(collection)?;
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        let mut watchers = self.watchers.lock();
        {
            let mut held = self.held.lock();
            match start {
                Start::Resume => {
                    held.remove(collection);
                }
                Start::UnlessHeld if held.contains(collection) => return Ok(()),
                Start::UnlessHeld => {}
            }
        }
        if let Some(existing) = watchers.get_mut(collection) {
            if existing.state.borrow().is_active() {
                return Ok(());
            }
            if let Some(task) = existing.task.take() {
                self.retire(task);
            }
        }

        let (state, _) = watch::channel(WatcherState::Starting);
        let state = Arc::new(state);
        let cancel = self.shutdown.child_token();
        let watcher = ChangeFeedWatcher {
            collection: collection.to_string(),
            source: Arc::clone(&self.source),
            publisher: self.publisher.clone(),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            reconnect: self.config.reconnect,
        };
        let task = tokio::spawn(watcher.run());

        debug!(
            subsystem = "realtime",
            component = "supervisor",
            op = "ensure_started",
            collection = %collection,
            "Change watcher spawned"
        );
        watchers.insert(
            collection.to_string(),
            WatcherHandle {
                state,
                cancel,
                task: Some(task),
            },
        );
        Ok(())
    }

    fn retire(&self, task: JoinHandle<()>) {
        let mut retiring = self.retiring.lock();
        retiring.retain(|t| !t.is_finished());
        retiring.push(task);
    }

    fn release_lease(&self) {
        let mut leases = self.leases.lock();
        *leases = leases.saturating_sub(1);
        if *leases > 0 || self.config.lifetime != WatcherLifetime::OnDemand {
            return;
        }

        let detached: Vec<JoinHandle<()>> = self
            .watchers
            .lock()
            .values_mut()
            .filter_map(WatcherHandle::detach)
            .collect();
        debug!(
            subsystem = "realtime",
            component = "supervisor",
            op = "release",
            watchers = detached.len(),
            "Last stream closed, stopping on-demand watchers"
        );
        for task in detached {
            self.retire(task);
        }
    }
}

async fn join_watcher(collection: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        error!(
            subsystem = "realtime",
            component = "supervisor",
            collection = %collection,
            error = %e,
            "Change watcher task failed"
        );
    }
}

/// Keeps watchers alive while a stream connection is open.
pub struct WatcherLease {
    inner: Arc<SupervisorInner>,
}

impl Drop for WatcherLease {
    fn drop(&mut self) {
        self.inner.release_lease();
    }
}
