//! Realtime entry points.
//!
//! WebSocket is the preferred transport. Browsers cannot attach headers to
//! a WS handshake, so the session token rides in the `session` query
//! parameter; the SSE fallback authenticates with the regular cookie.
//! Both gates (valid session and project membership) run before the
//! connection is registered, so a rejected handshake leaves no state.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, PRAGMA};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use colab_proto::RealtimeEvent;
use colab_realtime::{
    ChannelTransport, RealtimeConnection, RegistrationGuard, Transport, new_connection_id,
};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{CurrentUser, resolve_user};

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "projectId")]
    project_id: String,
    session: String,
}

pub async fn ws(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let CurrentUser(user) = resolve_user(&state, &query.session).await?;
    if !state.db.is_project_member(&query.project_id, &user.id)? {
        return Err(ApiError::not_found("Project not found or access denied"));
    }

    let project_id = query.project_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, project_id, user.id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, project_id: String, user_id: String) {
    let (transport, mut rx) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let connection_id = new_connection_id();

    let guard = RegistrationGuard::register(
        &state.registry,
        RealtimeConnection::new(
            connection_id.clone(),
            project_id.clone(),
            user_id,
            Arc::clone(&transport) as Arc<dyn Transport>,
        ),
    );

    let connected = RealtimeEvent::connected(&project_id, &connection_id);
    if let Ok(payload) = serde_json::to_string(&connected) {
        let _ = transport.send(&payload);
    }

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(payload) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                // Transport closed by the registry (heartbeat prune or
                // send failure elsewhere).
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sender.send(Message::Pong(payload)).await;
                }
                // Push-only endpoint: client text/binary frames are ignored.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, connection_id = %connection_id, "ws read error");
                    break;
                }
            },
        }
    }

    // Guard drop removes the registry entry and closes the transport.
    drop(guard);
    debug!(connection_id = %connection_id, "ws connection closed");
}

/// SSE fallback: `data: <json>\n\n` frames, `connected` first, heartbeats
/// every 30 seconds from the broadcaster sweep.
pub async fn sse(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(project_id): Path<String>,
) -> Result<Response, ApiError> {
    if !state.db.is_project_member(&project_id, &user.id)? {
        return Err(ApiError::not_found("Project not found or access denied"));
    }

    let (transport, rx) = ChannelTransport::new();
    let transport = Arc::new(transport);
    let connection_id = new_connection_id();

    let guard = RegistrationGuard::register(
        &state.registry,
        RealtimeConnection::new(
            connection_id.clone(),
            project_id.clone(),
            user.id,
            Arc::clone(&transport) as Arc<dyn Transport>,
        ),
    );

    let connected = RealtimeEvent::connected(&project_id, &connection_id);
    if let Ok(payload) = serde_json::to_string(&connected) {
        let _ = transport.send(&payload);
    }

    // The guard lives inside the stream closure: dropping the response
    // body (client went away) unregisters the connection.
    let stream = UnboundedReceiverStream::new(rx).map(move |payload| {
        let _keep_registered = &guard;
        Ok::<Event, Infallible>(Event::default().data(payload))
    });

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}
