//! In-process realtime fan-out.
//!
//! The [`ConnectionRegistry`] tracks live WebSocket/SSE connections; the
//! [`Broadcaster`] pushes task-lifecycle events to every connection
//! subscribed to a project, excluding the event's originator, and prunes
//! dead connections on a heartbeat interval.
//!
//! The registry is process-local by design: a multi-process deployment
//! needs sticky routing per project or an external pub/sub between
//! instances. That is a known scaling boundary, not something this crate
//! papers over.

mod broadcast;
mod registry;
mod transport;

pub use broadcast::{Broadcaster, HEARTBEAT_INTERVAL};
pub use registry::{ConnectionRegistry, RealtimeConnection, RegistrationGuard};
pub use transport::{ChannelTransport, SendError, Transport};

pub fn new_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
