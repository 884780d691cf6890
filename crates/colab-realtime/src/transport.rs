//! Transport capability behind the broadcaster.
//!
//! The broadcaster never sees a concrete socket type: WebSocket and SSE
//! connections (and test mocks) all expose the same `send`/`close`/
//! `is_open` surface. The channel-backed implementation decouples the
//! broadcast loop from socket I/O: a send here is an enqueue, and the
//! task that owns the receiving half performs the actual write.

use std::sync::Mutex;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport closed")
    }
}

impl std::error::Error for SendError {}

pub trait Transport: Send + Sync {
    /// Enqueue one serialized frame. Fire-and-forget: failures mean the
    /// receiving side is gone.
    fn send(&self, payload: &str) -> Result<(), SendError>;
    /// Close the transport. Safe to call more than once.
    fn close(&self);
    fn is_open(&self) -> bool;
}

/// Transport over an unbounded in-process channel. The connection task
/// owns the receiver and forwards frames to the real socket; dropping the
/// sender ends that task's read loop, which closes the socket.
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, payload: &str) -> Result<(), SendError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(payload.to_string()).map_err(|_| SendError),
            None => Err(SendError),
        }
    }

    fn close(&self) {
        // Dropping the sender wakes the owning task with `None`.
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn is_open(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_receiver_in_order() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send("one").unwrap();
        transport.send("two").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn close_ends_the_stream_and_is_idempotent() {
        let (transport, mut rx) = ChannelTransport::new();
        assert!(transport.is_open());

        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(transport.send("late").is_err());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn dropped_receiver_marks_transport_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(!transport.is_open());
        assert!(transport.send("into the void").is_err());
    }
}
