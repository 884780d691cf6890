//! End-to-end realtime tests: real listener, real WebSocket/SSE clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use colab_proto::UserRole;
use colab_server::config::Config;
use colab_server::mailer::RecordingMailer;
use colab_server::{AppState, app};
use colab_store::{Db, NewUser};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(300);

async fn spawn_server() -> (SocketAddr, AppState) {
    let db = Arc::new(Db::open_in_memory().expect("in-memory db"));
    let state = AppState::new(db, Arc::new(RecordingMailer::default()), Config::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("local addr");

    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server run");
    });

    (addr, state)
}

/// Seed a verified user and a live session; returns (user_id, token).
fn seed_user(state: &AppState, email: &str) -> (String, String) {
    let user = state
        .db
        .create_user(NewUser {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            contact_number: "555-0100".to_string(),
            password_hash: "unused".to_string(),
            role: UserRole::User,
            verification_token: None,
        })
        .expect("create user");
    state.db.mark_email_verified(&user.id).expect("verify");
    let session = state.sessions.create_session(&user.id).expect("session");
    (user.id, session.token)
}

async fn ws_connect(
    addr: SocketAddr,
    project_id: &str,
    token: &str,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://{addr}/ws?projectId={project_id}&session={token}");
    let (ws, _) = connect_async(url).await.expect("ws handshake");
    ws
}

async fn next_json(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> serde_json::Value {
    loop {
        let message = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for ws frame")
            .expect("ws closed")
            .expect("ws error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("valid json frame");
        }
    }
}

#[tokio::test]
async fn ws_handshake_rejected_without_valid_session() {
    let (addr, state) = spawn_server().await;
    let (user_id, _token) = seed_user(&state, "ada@example.com");
    let project = state.db.create_project("Apollo", None, &user_id).expect("project");

    let url = format!("ws://{addr}/ws?projectId={}&session=bogus.token", project.id);
    let result = connect_async(url).await;
    assert!(result.is_err(), "invalid session must refuse the handshake");

    // Nothing was registered for the rejected handshake.
    assert_eq!(state.registry.count_for(None), 0);
}

#[tokio::test]
async fn ws_handshake_rejected_for_non_member() {
    let (addr, state) = spawn_server().await;
    let (owner_id, _) = seed_user(&state, "owner@example.com");
    let (_outsider_id, outsider_token) = seed_user(&state, "outsider@example.com");
    let project = state.db.create_project("Apollo", None, &owner_id).expect("project");

    let url = format!(
        "ws://{addr}/ws?projectId={}&session={outsider_token}",
        project.id
    );
    assert!(connect_async(url).await.is_err());
    assert_eq!(state.registry.count_for(None), 0);
}

#[tokio::test]
async fn ws_connected_frame_arrives_first() {
    let (addr, state) = spawn_server().await;
    let (user_id, token) = seed_user(&state, "ada@example.com");
    let project = state.db.create_project("Apollo", None, &user_id).expect("project");

    let mut ws = ws_connect(addr, &project.id, &token).await;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "connected");
    assert_eq!(frame["projectId"], project.id.as_str());
    assert!(frame["connectionId"].is_string());
}

#[tokio::test]
async fn task_mutation_fans_out_excluding_originator_and_other_projects() {
    let (addr, state) = spawn_server().await;
    let (user_x, token_x) = seed_user(&state, "x@example.com");
    let (user_y, token_y) = seed_user(&state, "y@example.com");
    let project_a = state.db.create_project("Alpha", None, &user_x).expect("project a");
    let project_b = state.db.create_project("Beta", None, &user_x).expect("project b");
    state
        .db
        .add_member(&project_a.id, &user_y, colab_proto::ProjectRole::Editor)
        .expect("add member");

    let mut ws_x_a = ws_connect(addr, &project_a.id, &token_x).await;
    let mut ws_y_a = ws_connect(addr, &project_a.id, &token_y).await;
    let mut ws_x_b = ws_connect(addr, &project_b.id, &token_x).await;
    next_json(&mut ws_x_a).await;
    next_json(&mut ws_y_a).await;
    next_json(&mut ws_x_b).await;

    // User X creates a task over the HTTP API.
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/projects/{}/tasks", project_a.id))
        .header(reqwest::header::COOKIE, format!("session={token_x}"))
        .json(&serde_json::json!({ "title": "ship it" }))
        .send()
        .await
        .expect("create task");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    // The other member of the same project receives the event.
    let frame = next_json(&mut ws_y_a).await;
    assert_eq!(frame["type"], "task_created");
    assert_eq!(frame["userId"], user_x.as_str());
    assert_eq!(frame["data"]["task"]["title"], "ship it");

    // Neither the originator nor the other project hears anything.
    assert!(
        timeout(SILENCE, ws_x_a.next()).await.is_err(),
        "originator must not receive a self-echo"
    );
    assert!(
        timeout(SILENCE, ws_x_b.next()).await.is_err(),
        "other projects must not receive the event"
    );
}

#[tokio::test]
async fn status_change_broadcasts_task_moved_other_edits_task_updated() {
    let (addr, state) = spawn_server().await;
    let (user_x, token_x) = seed_user(&state, "x@example.com");
    let (user_y, token_y) = seed_user(&state, "y@example.com");
    let project = state.db.create_project("Alpha", None, &user_x).expect("project");
    state
        .db
        .add_member(&project.id, &user_y, colab_proto::ProjectRole::Editor)
        .expect("add member");
    let task = state
        .db
        .create_task(&project.id, &user_x, "ship it", None, None, None)
        .expect("task");

    let mut ws_y = ws_connect(addr, &project.id, &token_y).await;
    next_json(&mut ws_y).await;

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/projects/{}/tasks/{}", project.id, task.id);

    // Column change -> task_moved.
    client
        .put(&url)
        .header(reqwest::header::COOKIE, format!("session={token_x}"))
        .json(&serde_json::json!({ "status": "in_progress" }))
        .send()
        .await
        .expect("move task");
    let frame = next_json(&mut ws_y).await;
    assert_eq!(frame["type"], "task_moved");

    // Title-only change -> task_updated.
    client
        .put(&url)
        .header(reqwest::header::COOKIE, format!("session={token_x}"))
        .json(&serde_json::json!({ "title": "ship it faster" }))
        .send()
        .await
        .expect("rename task");
    let frame = next_json(&mut ws_y).await;
    assert_eq!(frame["type"], "task_updated");

    // Deleting broadcasts the id.
    client
        .delete(&url)
        .header(reqwest::header::COOKIE, format!("session={token_x}"))
        .send()
        .await
        .expect("delete task");
    let frame = next_json(&mut ws_y).await;
    assert_eq!(frame["type"], "task_deleted");
    assert_eq!(frame["data"]["taskId"], task.id.as_str());
}

#[tokio::test]
async fn closed_socket_leaves_registry_after_sweep() {
    let (addr, state) = spawn_server().await;
    let (user_id, token) = seed_user(&state, "ada@example.com");
    let project = state.db.create_project("Apollo", None, &user_id).expect("project");

    let mut ws = ws_connect(addr, &project.id, &token).await;
    next_json(&mut ws).await;
    assert_eq!(state.registry.count_for(Some(&project.id)), 1);

    ws.close(None).await.expect("close");
    drop(ws);

    // The server task unregisters on close; poll until it has.
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while state.registry.count_for(Some(&project.id)) != 0 {
        assert!(tokio::time::Instant::now() < deadline, "connection never pruned");
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.broadcaster.sweep_heartbeats();
    }
}

#[tokio::test]
async fn sse_stream_sends_connected_frame_first() {
    let (addr, state) = spawn_server().await;
    let (user_id, token) = seed_user(&state, "ada@example.com");
    let project = state.db.create_project("Apollo", None, &user_id).expect("project");

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/projects/{}/realtime", project.id))
        .header(reqwest::header::COOKIE, format!("session={token}"))
        .send()
        .await
        .expect("sse request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"))
    );
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok()),
        Some("no-cache, no-store, must-revalidate")
    );

    let mut body = response.bytes_stream();
    let chunk = timeout(RECV_TIMEOUT, body.next())
        .await
        .expect("timed out waiting for sse frame")
        .expect("stream ended")
        .expect("stream error");
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.starts_with("data: "), "unexpected frame: {text}");
    assert!(text.contains("\"type\":\"connected\""));
    assert!(text.ends_with("\n\n"));

    assert_eq!(state.registry.count_for(Some(&project.id)), 1);
}

#[tokio::test]
async fn sse_rejected_for_non_member() {
    let (addr, state) = spawn_server().await;
    let (owner_id, _) = seed_user(&state, "owner@example.com");
    let (_outsider, outsider_token) = seed_user(&state, "outsider@example.com");
    let project = state.db.create_project("Apollo", None, &owner_id).expect("project");

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/api/projects/{}/realtime", project.id))
        .header(reqwest::header::COOKIE, format!("session={outsider_token}"))
        .send()
        .await
        .expect("sse request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(state.registry.count_for(None), 0);
}
