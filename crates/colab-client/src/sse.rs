//! SSE fallback transport session.
//!
//! Unidirectional: events flow server-to-client only, authenticated with
//! the session cookie like any other HTTP request.

use colab_proto::RealtimeEvent;
use futures_util::StreamExt;
use reqwest::header::COOKIE;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::driver::SessionEnd;
use crate::{ClientConfig, ConnectionState, parse_wire_event};

pub(crate) async fn run(
    config: &ClientConfig,
    project_id: &str,
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    state: &watch::Sender<ConnectionState>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let url = format!("{}/api/projects/{project_id}/realtime", config.base_url);
    let request = reqwest::Client::new()
        .get(&url)
        .header(COOKIE, format!("session={}", config.session_token));

    let mut source = match EventSource::new(request) {
        Ok(source) => source,
        Err(error) => {
            warn!(%error, "failed to build sse request");
            return SessionEnd::Failed { was_connected: false };
        }
    };

    let mut was_connected = false;
    loop {
        tokio::select! {
            event = source.next() => match event {
                Some(Ok(SseEvent::Open)) => {
                    was_connected = true;
                    let _ = state.send(ConnectionState::Connected);
                    debug!(project_id, "sse connected");
                }
                Some(Ok(SseEvent::Message(message))) => {
                    if let Some(event) = parse_wire_event(&message.data) {
                        if events.send(event).is_err() {
                            source.close();
                            return SessionEnd::Shutdown;
                        }
                    }
                }
                Some(Err(error)) => {
                    debug!(%error, "sse stream error");
                    source.close();
                    return SessionEnd::Failed { was_connected };
                }
                None => {
                    return SessionEnd::Failed { was_connected };
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    source.close();
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}
