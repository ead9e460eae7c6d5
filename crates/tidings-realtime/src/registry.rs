//! Process-local registry of open stream connections.
//!
//! Connections are grouped by [`Scope`]: every stream is registered under
//! [`Scope::Broadcast`], and additionally under [`Scope::User`] when the caller
//! identified itself. A single user may hold several connections (tabs,
//! devices); each one is a separate [`ConnectionHandle`].
//!
//! The map sits behind a synchronous [`parking_lot::RwLock`] so that
//! [`ConnectionGuard`] can deregister from `Drop`. Iteration always works on a
//! snapshot copied under the read lock; callbacks never run with the lock held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use tidings_core::Scope;

/// Registry-assigned connection identifier.
pub type ConnectionId = u64;

/// Writable side of one open stream connection.
///
/// The receiving half is drained by the connection's response body, which is
/// the only writer to the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Bytes>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Bytes>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sender(&self) -> &mpsc::Sender<Bytes> {
        &self.tx
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Thread-safe map from [`Scope`] to open connection handles.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    scopes: RwLock<HashMap<Scope, Vec<ConnectionHandle>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add `handle` under `scope`. Registering the same connection twice under
    /// one scope is a no-op.
    pub fn register(&self, scope: Scope, handle: ConnectionHandle) {
        let mut scopes = self.scopes.write();
        let handles = scopes.entry(scope).or_default();
        if handles.iter().any(|h| h.id == handle.id) {
            return;
        }
        debug!(
            subsystem = "realtime",
            component = "registry",
            op = "register",
            connection_id = handle.id,
            scope = %scope,
            "Connection registered"
        );
        handles.push(handle);
    }

    /// Remove connection `id` from `scope`. Idempotent; returns whether a handle
    /// was removed.
    pub fn unregister(&self, scope: Scope, id: ConnectionId) -> bool {
        let mut scopes = self.scopes.write();
        let Some(handles) = scopes.get_mut(&scope) else {
            return false;
        };
        let before = handles.len();
        handles.retain(|h| h.id != id);
        let removed = handles.len() != before;
        if handles.is_empty() {
            scopes.remove(&scope);
        }
        if removed {
            debug!(
                subsystem = "realtime",
                component = "registry",
                op = "unregister",
                connection_id = id,
                scope = %scope,
                "Connection unregistered"
            );
        }
        removed
    }

    /// Register `handle` under every scope in `scopes` and return a guard that
    /// removes it again when dropped.
    pub fn attach(
        self: &Arc<Self>,
        scopes: impl IntoIterator<Item = Scope>,
        handle: ConnectionHandle,
    ) -> ConnectionGuard {
        let id = handle.id;
        let scopes: Vec<Scope> = scopes.into_iter().collect();
        for scope in &scopes {
            self.register(*scope, handle.clone());
        }
        ConnectionGuard {
            registry: Arc::clone(self),
            id,
            scopes,
        }
    }

    /// Copy of the handles currently registered under `scope`.
    pub fn snapshot(&self, scope: Scope) -> Vec<ConnectionHandle> {
        self.scopes
            .read()
            .get(&scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Call `f` for every handle under `scope`, on a snapshot.
    pub fn for_each(&self, scope: Scope, mut f: impl FnMut(&ConnectionHandle)) {
        for handle in self.snapshot(scope).iter() {
            f(handle);
        }
    }

    /// Call `f` for every broadcast handle, on a snapshot.
    pub fn for_each_broadcast(&self, f: impl FnMut(&ConnectionHandle)) {
        self.for_each(Scope::Broadcast, f);
    }

    /// Number of handles under `scope`.
    pub fn connection_count(&self, scope: Scope) -> usize {
        self.scopes.read().get(&scope).map_or(0, Vec::len)
    }

    /// Number of open stream connections (every stream joins the broadcast scope).
    pub fn total_connections(&self) -> usize {
        self.connection_count(Scope::Broadcast)
    }
}

/// Deregisters a connection from all of its scopes on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    scopes: Vec<Scope>,
}

impl ConnectionGuard {
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        for scope in &self.scopes {
            self.registry.unregister(*scope, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn handle(registry: &ConnectionRegistry) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(registry.next_connection_id(), tx), rx)
    }

    #[test]
    fn test_register_multiple_handles_per_scope() {
        let registry = ConnectionRegistry::new();
        let user = Scope::User(Uuid::new_v4());
        let (a, _ra) = handle(&registry);
        let (b, _rb) = handle(&registry);

        registry.register(user, a.clone());
        registry.register(user, b);
        registry.register(user, a);

        assert_eq!(registry.connection_count(user), 2);
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = handle(&registry);
        registry.register(Scope::Broadcast, a.clone());

        assert!(registry.unregister(Scope::Broadcast, a.id()));
        assert!(!registry.unregister(Scope::Broadcast, a.id()));
        assert!(!registry.unregister(Scope::User(Uuid::new_v4()), a.id()));
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.next_connection_id();
        let b = registry.next_connection_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = handle(&registry);
        registry.register(Scope::Broadcast, a.clone());

        let mut seen = Vec::new();
        registry.for_each_broadcast(|h| {
            // Mutating the registry mid-iteration must not deadlock
            registry.unregister(Scope::Broadcast, h.id());
            seen.push(h.id());
        });

        assert_eq!(seen, vec![a.id()]);
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn test_guard_unregisters_every_scope() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Scope::User(Uuid::new_v4());
        let (a, _ra) = handle(&registry);

        let guard = registry.attach([Scope::Broadcast, user], a);
        assert_eq!(registry.total_connections(), 1);
        assert_eq!(registry.connection_count(user), 1);

        drop(guard);
        assert_eq!(registry.total_connections(), 0);
        assert_eq!(registry.connection_count(user), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_pairs() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Scope::User(Uuid::new_v4());

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                let h = ConnectionHandle::new(registry.next_connection_id(), tx);
                let id = h.id();
                registry.register(user, h);
                tokio::task::yield_now().await;
                registry.unregister(user, id);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connection_count(user), 0);
    }
}
