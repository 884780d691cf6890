//! Connection driver: one task per `connect` call.
//!
//! Owns the retry ladder. WebSocket attempts come first; after
//! `max_ws_attempts` consecutive failures the driver switches to SSE for
//! the remainder of the session and never goes back.

use std::time::Duration;

use colab_proto::RealtimeEvent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::{ClientConfig, ConnectionState, sse, ws};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Sse,
}

/// How a single transport session ended.
pub(crate) enum SessionEnd {
    /// `disconnect()` was called; the transport closed normally.
    Shutdown,
    /// Handshake failure or abnormal close. `was_connected` reports
    /// whether the transport ever opened (a successful open resets the
    /// attempt counter, matching browser reconnect behavior).
    Failed { was_connected: bool },
}

pub(crate) struct Session {
    pub config: ClientConfig,
    pub project_id: String,
    pub events: mpsc::UnboundedSender<RealtimeEvent>,
    pub state: watch::Sender<ConnectionState>,
    pub shutdown: watch::Receiver<bool>,
}

impl Session {
    pub(crate) async fn run(mut self) {
        let mut transport = TransportKind::WebSocket;
        let mut attempt: u32 = 0;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let _ = self.state.send(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            let end = match transport {
                TransportKind::WebSocket => {
                    ws::run(
                        &self.config,
                        &self.project_id,
                        &self.events,
                        &self.state,
                        &mut self.shutdown,
                    )
                    .await
                }
                TransportKind::Sse => {
                    sse::run(
                        &self.config,
                        &self.project_id,
                        &self.events,
                        &self.state,
                        &mut self.shutdown,
                    )
                    .await
                }
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Failed { was_connected } => {
                    if was_connected {
                        attempt = 0;
                    }
                    attempt += 1;

                    let max_attempts = match transport {
                        TransportKind::WebSocket => self.config.max_ws_attempts,
                        TransportKind::Sse => self.config.max_sse_attempts,
                    };
                    if attempt >= max_attempts {
                        match transport {
                            TransportKind::WebSocket => {
                                // Permanent fallback for the rest of the session.
                                debug!("websocket attempts exhausted, falling back to SSE");
                                transport = TransportKind::Sse;
                                attempt = 0;
                                continue;
                            }
                            TransportKind::Sse => {
                                warn!("sse attempts exhausted, giving up");
                                let _ = self.state.send(ConnectionState::Failed);
                                return;
                            }
                        }
                    }

                    let delay = self.config.backoff_unit * attempt;
                    if self.wait_backoff(delay).await {
                        break;
                    }
                }
            }
        }
        // Shutdown-initiated exits land here; `disconnect()` already set
        // the Disconnected state before this task observed the signal, and
        // a replacement driver may have moved it on since. Don't stomp it.
    }

    /// Sleep out the backoff; returns true if shutdown arrived first.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.shutdown.changed() => *self.shutdown.borrow(),
        }
    }
}
