//! WebSocket transport session.

use colab_proto::RealtimeEvent;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};

use crate::driver::SessionEnd;
use crate::{ClientConfig, ConnectionState, parse_wire_event};

/// Browser WebSocket handshakes cannot set custom headers, so the session
/// token travels in the query string. Both halves of the token and the
/// project id are URL-safe by construction.
fn ws_url(base_url: &str, project_id: &str, session_token: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base_url}")
    };
    format!("{ws_base}/ws?projectId={project_id}&session={session_token}")
}

pub(crate) async fn run(
    config: &ClientConfig,
    project_id: &str,
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    state: &watch::Sender<ConnectionState>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let url = ws_url(&config.base_url, project_id, &config.session_token);

    let mut ws = match connect_async(url).await {
        Ok((ws, _response)) => ws,
        Err(error) => {
            debug!(%error, "websocket handshake failed");
            return SessionEnd::Failed { was_connected: false };
        }
    };

    let _ = state.send(ConnectionState::Connected);
    debug!(project_id, "websocket connected");

    loop {
        tokio::select! {
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_wire_event(text.as_str()) {
                        if events.send(event).is_err() {
                            // Consumer dropped the stream; treat as shutdown.
                            let _ = close_normally(&mut ws).await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Failed { was_connected: true };
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, "websocket error");
                    return SessionEnd::Failed { was_connected: true };
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = close_normally(&mut ws).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn close_normally(ws: &mut WsStream) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnecting".into(),
    })))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme_and_carries_params() {
        let url = ws_url("http://127.0.0.1:3001", "p1", "id.secret");
        assert_eq!(url, "ws://127.0.0.1:3001/ws?projectId=p1&session=id.secret");

        let tls = ws_url("https://colab.example", "p1", "t.t");
        assert!(tls.starts_with("wss://colab.example/ws?"));
    }
}
