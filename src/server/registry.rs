// Copyright (c) 2024-present, snapdb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The live-connection registry (`spec.md` §9: "the source's
//! `WeakList<ClientConnection>`, scanned by a maintenance timer to drop
//! dead entries, re-expressed as a concurrent list safe to enumerate
//! during insert/remove, indexed by an opaque handle rather than the
//! connection object's identity").
//!
//! Grounded structurally on [`crate::engine::archive_list::ArchiveList`]:
//! a `Mutex` guarding an `Arc<Vec<_>>`, so `snapshot()` callers (status
//! reporting, shutdown) see a stable membership even while a connection
//! thread concurrently registers or deregisters.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One tracked connection's bookkeeping; dropping the last [`Arc`]
/// (when the worker thread exits) is what [`ConnectionRegistry::sweep`]
/// later notices and removes.
pub struct ConnectionHandle {
    pub id: u64,
    pub peer: SocketAddr,
    pub connected_at: Instant,
    pub user: Mutex<Option<String>>,
}

impl ConnectionHandle {
    fn new(id: u64, peer: SocketAddr) -> Self {
        Self { id, peer, connected_at: Instant::now(), user: Mutex::new(None) }
    }

    /// Records the authenticated username once the handshake completes;
    /// unauthenticated connections show `None` in status reports.
    pub fn set_user(&self, user: String) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        *self.user.lock().expect("lock poisoned") = Some(user);
    }

    /// The authenticated username, if the handshake has completed.
    #[must_use]
    pub fn user(&self) -> Option<String> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.user.lock().expect("lock poisoned").clone()
    }
}

/// A registration guard: the worker holds this for the connection's
/// lifetime, and drops it on exit, at which point `sweep` or the next
/// `snapshot` finds the slot's weak reference stale.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    entries: Mutex<Arc<Vec<Arc<ConnectionHandle>>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), entries: Mutex::new(Arc::new(Vec::new())) }
    }

    /// Registers a new connection and returns its handle plus a drop
    /// guard the caller keeps alive for the connection's lifetime.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> (Arc<ConnectionHandle>, Registration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnectionHandle::new(id, peer));

        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut guard = self.entries.lock().expect("lock poisoned");
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::clone(&handle));
        *guard = Arc::new(next);
        drop(guard);

        (handle, Registration { registry: Arc::clone(self), id })
    }

    fn remove(&self, id: u64) {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut guard = self.entries.lock().expect("lock poisoned");
        let next: Vec<Arc<ConnectionHandle>> = guard.iter().filter(|h| h.id != id).cloned().collect();
        *guard = Arc::new(next);
    }

    /// The current set of live connections. Safe to call while other
    /// threads concurrently register or deregister; this snapshot never
    /// observes a torn update.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<ConnectionHandle>>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        self.entries.lock().expect("lock poisoned").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn registering_and_dropping_updates_the_snapshot() {
        let registry = Arc::new(ConnectionRegistry::new());
        let peer: SocketAddr = "127.0.0.1:1".parse().expect("addr");

        let (_handle, registration) = registry.register(peer);
        assert_eq!(registry.len(), 1);

        drop(registration);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn snapshot_is_stable_across_concurrent_register() {
        let registry = Arc::new(ConnectionRegistry::new());
        let peer: SocketAddr = "127.0.0.1:1".parse().expect("addr");

        let (_a, reg_a) = registry.register(peer);
        let observed = registry.snapshot();
        let (_b, reg_b) = registry.register(peer);

        assert_eq!(observed.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
        drop(reg_a);
        drop(reg_b);
    }
}
