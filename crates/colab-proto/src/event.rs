//! Realtime event envelope pushed to connected clients.
//!
//! The same JSON shape travels over both transports: WebSocket text frames
//! and SSE `data:` frames. Events are immutable value objects: request
//! handlers construct them once and hand them to the broadcaster.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConnectionId, ProjectId, UserId, time::now_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    Connected,
    Heartbeat,
}

/// Wire envelope: `{ type, projectId?, userId?, data?, timestamp, connectionId? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Originating user, used by the broadcaster to suppress self-echo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
}

impl RealtimeEvent {
    fn task_event(kind: EventKind, project_id: &str, user_id: &str, data: Value) -> Self {
        Self {
            kind,
            project_id: Some(project_id.to_string()),
            user_id: Some(user_id.to_string()),
            data: Some(data),
            timestamp: now_ms(),
            connection_id: None,
        }
    }

    pub fn task_created(project_id: &str, user_id: &str, task: Value) -> Self {
        Self::task_event(
            EventKind::TaskCreated,
            project_id,
            user_id,
            serde_json::json!({ "task": task }),
        )
    }

    pub fn task_updated(project_id: &str, user_id: &str, task: Value) -> Self {
        Self::task_event(
            EventKind::TaskUpdated,
            project_id,
            user_id,
            serde_json::json!({ "task": task }),
        )
    }

    /// Status transition: the task changed board column.
    pub fn task_moved(project_id: &str, user_id: &str, task: Value) -> Self {
        Self::task_event(
            EventKind::TaskMoved,
            project_id,
            user_id,
            serde_json::json!({ "task": task }),
        )
    }

    pub fn task_deleted(project_id: &str, user_id: &str, task_id: &str) -> Self {
        Self::task_event(
            EventKind::TaskDeleted,
            project_id,
            user_id,
            serde_json::json!({ "taskId": task_id }),
        )
    }

    /// First frame sent on every freshly registered connection.
    pub fn connected(project_id: &str, connection_id: &str) -> Self {
        Self {
            kind: EventKind::Connected,
            project_id: Some(project_id.to_string()),
            user_id: None,
            data: None,
            timestamp: now_ms(),
            connection_id: Some(connection_id.to_string()),
        }
    }

    /// Liveness probe; clients discard these without surfacing them.
    pub fn heartbeat() -> Self {
        Self {
            kind: EventKind::Heartbeat,
            project_id: None,
            user_id: None,
            data: None,
            timestamp: now_ms(),
            connection_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trip() {
        let event = RealtimeEvent::task_created("p1", "u1", serde_json::json!({"id": "t1"}));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RealtimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::TaskCreated);
        assert_eq!(parsed.project_id.as_deref(), Some("p1"));
        assert_eq!(parsed.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn wire_tag_is_snake_case_type_field() {
        let event = RealtimeEvent::task_moved("p1", "u1", serde_json::json!({}));
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task_moved");
        assert_eq!(value["projectId"], "p1");
    }

    #[test]
    fn heartbeat_has_no_project_scope() {
        let event = RealtimeEvent::heartbeat();
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert!(value.get("projectId").is_none());
        assert!(value.get("connectionId").is_none());
    }

    #[test]
    fn connected_frame_carries_connection_id() {
        let event = RealtimeEvent::connected("p1", "c-42");
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["connectionId"], "c-42");
        assert_eq!(value["projectId"], "p1");
    }
}
