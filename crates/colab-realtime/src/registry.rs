//! Live connection bookkeeping.
//!
//! The registry is an injectable component owned by server state, not a
//! module-level singleton, so tests can spin up as many independent
//! registries as they need. It holds no persistence: the map is rebuilt
//! from scratch when the process restarts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use colab_proto::time::now_ms;
use dashmap::DashMap;
use tracing::debug;

use crate::transport::Transport;

pub struct RealtimeConnection {
    pub id: String,
    /// Subscription scope: one project per connection.
    pub project_id: String,
    /// Owner, used to suppress self-echo.
    pub user_id: String,
    pub transport: Arc<dyn Transport>,
    last_ping: AtomicU64,
}

impl RealtimeConnection {
    pub fn new(
        id: String,
        project_id: String,
        user_id: String,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id,
            project_id,
            user_id,
            transport,
            last_ping: AtomicU64::new(now_ms()),
        }
    }

    pub fn last_ping(&self) -> u64 {
        self.last_ping.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_ping(&self) {
        self.last_ping.store(now_ms(), Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<RealtimeConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection by id.
    pub fn add(&self, connection: RealtimeConnection) {
        let id = connection.id.clone();
        self.connections.insert(id.clone(), Arc::new(connection));
        debug!(connection_id = %id, total = self.connections.len(), "connection registered");
    }

    /// Close the transport and drop the entry. Safe to call repeatedly;
    /// the transport is only closed on the call that removes the entry.
    pub fn remove(&self, id: &str) {
        if let Some((_, connection)) = self.connections.remove(id) {
            connection.transport.close();
            debug!(connection_id = %id, total = self.connections.len(), "connection removed");
        }
    }

    /// Total live connections, or just those subscribed to one project.
    pub fn count_for(&self, project_id: Option<&str>) -> usize {
        match project_id {
            Some(project_id) => self
                .connections
                .iter()
                .filter(|entry| entry.project_id == project_id)
                .count(),
            None => self.connections.len(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<RealtimeConnection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// RAII handle tying a registry entry to its connection task: the entry is
/// removed (and the transport closed) when the guard drops, so a task that
/// exits for any reason (close, error, panic) cannot leak its entry.
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    id: String,
}

impl RegistrationGuard {
    /// Register `connection` and bind its lifetime to the returned guard.
    pub fn register(registry: &Arc<ConnectionRegistry>, connection: RealtimeConnection) -> Self {
        let id = connection.id.clone();
        registry.add(connection);
        Self {
            registry: Arc::clone(registry),
            id,
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
