//! Event fan-out and liveness probing.

use std::sync::Arc;
use std::time::Duration;

use colab_proto::RealtimeEvent;
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every connection subscribed to its project,
    /// excluding the originating user. The event is serialized once. A
    /// failed send removes that connection only and never aborts delivery
    /// to the remaining subscribers. Returns the delivered count.
    pub fn publish(&self, event: &RealtimeEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to serialize realtime event");
                return 0;
            }
        };

        let project_id = event.project_id.as_deref();
        let originator = event.user_id.as_deref();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for connection in self.registry.snapshot() {
            if Some(connection.project_id.as_str()) != project_id {
                continue;
            }
            if originator.is_some() && Some(connection.user_id.as_str()) == originator {
                continue;
            }
            match connection.transport.send(&payload) {
                Ok(()) => delivered += 1,
                Err(_) => failed.push(connection.id.clone()),
            }
        }

        for id in failed {
            warn!(connection_id = %id, "send failed, dropping connection");
            self.registry.remove(&id);
        }

        debug!(kind = ?event.kind, delivered, "published realtime event");
        delivered
    }

    pub fn publish_task_created(&self, project_id: &str, user_id: &str, task: Value) -> usize {
        self.publish(&RealtimeEvent::task_created(project_id, user_id, task))
    }

    pub fn publish_task_updated(&self, project_id: &str, user_id: &str, task: Value) -> usize {
        self.publish(&RealtimeEvent::task_updated(project_id, user_id, task))
    }

    /// For mutations that changed the task's board column.
    pub fn publish_task_moved(&self, project_id: &str, user_id: &str, task: Value) -> usize {
        self.publish(&RealtimeEvent::task_moved(project_id, user_id, task))
    }

    pub fn publish_task_deleted(&self, project_id: &str, user_id: &str, task_id: &str) -> usize {
        self.publish(&RealtimeEvent::task_deleted(project_id, user_id, task_id))
    }

    /// Probe every connection with a heartbeat frame and drop the ones
    /// whose transport is closed or refuses the send. Bounds registry
    /// growth under silently-dropped clients. Returns the removed count.
    pub fn sweep_heartbeats(&self) -> usize {
        let payload = match serde_json::to_string(&RealtimeEvent::heartbeat()) {
            Ok(payload) => payload,
            Err(_) => return 0,
        };

        let mut dead = Vec::new();
        for connection in self.registry.snapshot() {
            if !connection.transport.is_open() || connection.transport.send(&payload).is_err() {
                dead.push(connection.id.clone());
            } else {
                connection.mark_ping();
            }
        }

        let removed = dead.len();
        for id in dead {
            self.registry.remove(&id);
        }
        if removed > 0 {
            debug!(removed, "heartbeat sweep pruned dead connections");
        }
        removed
    }

    /// Periodic heartbeat loop; spawn once at server startup.
    pub async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh server
        // waits a full interval before the first sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep_heartbeats();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RealtimeConnection;
    use crate::transport::{SendError, Transport};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
        close_calls: AtomicUsize,
        fail_sends: AtomicBool,
    }

    impl MockTransport {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, payload: &str) -> Result<(), SendError> {
            if self.closed.load(Ordering::SeqCst) || self.fail_sends.load(Ordering::SeqCst) {
                return Err(SendError);
            }
            self.sent.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    fn register(
        registry: &Arc<ConnectionRegistry>,
        id: &str,
        project: &str,
        user: &str,
    ) -> Arc<MockTransport> {
        let transport = Arc::new(MockTransport::default());
        registry.add(RealtimeConnection::new(
            id.into(),
            project.into(),
            user.into(),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));
        transport
    }

    #[test]
    fn delivers_to_same_project_other_users_only() {
        let registry = Arc::new(ConnectionRegistry::new());
        let c1 = register(&registry, "c1", "projectA", "userX");
        let c2 = register(&registry, "c2", "projectA", "userY");
        let c3 = register(&registry, "c3", "projectB", "userX");
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let delivered =
            broadcaster.publish_task_created("projectA", "userX", serde_json::json!({"id": "t1"}));

        assert_eq!(delivered, 1);
        assert!(c1.sent().is_empty(), "originator must not receive an echo");
        assert_eq!(c2.sent().len(), 1);
        assert!(c3.sent().is_empty(), "other projects must not receive the event");

        let frame: serde_json::Value = serde_json::from_str(&c2.sent()[0]).unwrap();
        assert_eq!(frame["type"], "task_created");
        assert_eq!(frame["projectId"], "projectA");
    }

    #[test]
    fn delivers_to_all_n_subscribers_when_originator_absent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let transports: Vec<_> = (0..4)
            .map(|i| register(&registry, &format!("c{i}"), "p1", &format!("u{i}")))
            .collect();
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let delivered =
            broadcaster.publish_task_updated("p1", "someone-else", serde_json::json!({}));
        assert_eq!(delivered, 4);
        for transport in transports {
            assert_eq!(transport.sent().len(), 1);
        }
    }

    #[test]
    fn send_failure_removes_only_that_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broken = register(&registry, "broken", "p1", "u1");
        broken.fail_sends.store(true, Ordering::SeqCst);
        let healthy = register(&registry, "healthy", "p1", "u2");
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let delivered = broadcaster.publish_task_deleted("p1", "u0", "t1");

        assert_eq!(delivered, 1);
        assert_eq!(healthy.sent().len(), 1);
        assert!(!registry.contains("broken"));
        assert!(registry.contains("healthy"));
    }

    #[test]
    fn heartbeat_sweep_prunes_closed_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let c1 = register(&registry, "c1", "projectA", "userX");
        let c2 = register(&registry, "c2", "projectA", "userY");
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        c1.close();
        let removed = broadcaster.sweep_heartbeats();

        assert_eq!(removed, 1);
        assert_eq!(registry.count_for(Some("projectA")), 1);
        assert!(!registry.contains("c1"));

        // Surviving connection got the heartbeat frame.
        let frames = c2.sent();
        assert_eq!(frames.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["type"], "heartbeat");
    }

    #[test]
    fn sweep_refreshes_last_ping_on_survivors() {
        let registry = Arc::new(ConnectionRegistry::new());
        register(&registry, "c1", "p1", "u1");
        let before = registry.snapshot()[0].last_ping();
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        std::thread::sleep(std::time::Duration::from_millis(5));
        broadcaster.sweep_heartbeats();

        let after = registry.snapshot()[0].last_ping();
        assert!(after > before, "probe should refresh the liveness stamp");
    }

    #[test]
    fn sweep_does_not_double_close() {
        let registry = Arc::new(ConnectionRegistry::new());
        let c1 = register(&registry, "c1", "p1", "u1");
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        c1.close();
        broadcaster.sweep_heartbeats();
        registry.remove("c1");

        // One close from the test, one from registry removal; the second
        // remove is a no-op.
        assert_eq!(c1.close_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let c1 = register(&registry, "c1", "p1", "u1");
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        broadcaster.publish_task_created("p1", "u0", serde_json::json!({"n": 1}));
        broadcaster.publish_task_updated("p1", "u0", serde_json::json!({"n": 2}));
        broadcaster.publish_task_deleted("p1", "u0", "t1");

        let kinds: Vec<String> = c1
            .sent()
            .iter()
            .map(|frame| {
                serde_json::from_str::<serde_json::Value>(frame).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(kinds, ["task_created", "task_updated", "task_deleted"]);
    }

}
