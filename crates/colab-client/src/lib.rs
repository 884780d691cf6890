//! Realtime client adapter.
//!
//! Connects to one project's event stream at a time, preferring the
//! bidirectional WebSocket transport and falling back permanently to SSE
//! once the WebSocket attempts are exhausted. Reconnects use linear
//! backoff (`attempt x backoff_unit`). Heartbeat frames keep the
//! transport alive and are consumed here; every other event surfaces
//! exactly once on the returned stream.
//!
//! The connection lifecycle is an explicit state machine driven by a
//! single task per `connect` call:
//! `Disconnected -> Connecting -> Connected -> (Disconnected | Reconnecting) -> ...`

mod driver;
mod sse;
mod ws;

use std::sync::Mutex;
use std::time::Duration;

use colab_proto::{EventKind, RealtimeEvent};
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Both transports gave up; the stream is over.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP origin of the server, e.g. `http://127.0.0.1:3001`.
    pub base_url: String,
    /// Session token (`id.secret`); rides the query string for WebSocket
    /// handshakes and the cookie for SSE.
    pub session_token: String,
    /// WebSocket attempts before the permanent SSE fallback.
    pub max_ws_attempts: u32,
    /// SSE attempts before giving up entirely.
    pub max_sse_attempts: u32,
    /// Backoff unit; the delay before attempt N is `N x backoff_unit`.
    pub backoff_unit: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_token: session_token.into(),
            max_ws_attempts: 5,
            max_sse_attempts: 5,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

/// Typed event stream handed to the UI layer.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
}

impl EventStream {
    /// Next domain event; `None` once the connection is fully torn down.
    pub async fn next(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }
}

struct ActiveConnection {
    shutdown: watch::Sender<bool>,
    project_id: String,
}

pub struct RealtimeClient {
    config: ClientConfig,
    state_tx: watch::Sender<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
}

impl RealtimeClient {
    pub fn new(config: ClientConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state_tx,
            active: Mutex::new(None),
        }
    }

    /// Observe connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to a project's events. Any existing connection, even for
    /// another project, is torn down first, so no two live subscriptions
    /// coexist.
    pub fn connect(&self, project_id: &str) -> EventStream {
        self.disconnect();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = driver::Session {
            config: self.config.clone(),
            project_id: project_id.to_string(),
            events: events_tx,
            state: self.state_tx.clone(),
            shutdown: shutdown_rx,
        };
        tokio::spawn(session.run());

        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(ActiveConnection {
            shutdown: shutdown_tx,
            project_id: project_id.to_string(),
        });

        EventStream { rx: events_rx }
    }

    /// Tear down the active connection with a normal closure. Idempotent;
    /// the signal is sent synchronously so a follow-up `connect` cannot
    /// race the old subscription.
    pub fn disconnect(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(active) = previous {
            debug!(project_id = %active.project_id, "disconnecting realtime client");
            let _ = active.shutdown.send(true);
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Parse a wire frame, dropping heartbeats and garbage.
pub(crate) fn parse_wire_event(text: &str) -> Option<RealtimeEvent> {
    let event: RealtimeEvent = serde_json::from_str(text).ok()?;
    if event.kind == EventKind::Heartbeat {
        return None;
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeats_are_filtered_out() {
        let heartbeat = serde_json::to_string(&RealtimeEvent::heartbeat()).unwrap();
        assert!(parse_wire_event(&heartbeat).is_none());

        let connected = serde_json::to_string(&RealtimeEvent::connected("p1", "c1")).unwrap();
        let event = parse_wire_event(&connected).unwrap();
        assert_eq!(event.kind, EventKind::Connected);
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert!(parse_wire_event("not json").is_none());
        assert!(parse_wire_event("{\"type\":\"mystery\"}").is_none());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_resets_state() {
        let client = RealtimeClient::new(ClientConfig::new("http://127.0.0.1:1", "t.t"));
        client.disconnect();
        client.disconnect();
        assert_eq!(*client.state().borrow(), ConnectionState::Disconnected);
    }
}
