// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Builders for the server->client envelope.
//!
//! The envelope shape (`{type, project_id?, data, timestamp}`) is exactly
//! [`hub_core::MessageRecord`] — the same value is both the broadcast unit
//! and the persisted log line. These builders just fill in the right
//! `kind`/`data` pair for each notable `type` the wire contract names.

use chrono::{DateTime, Utc};
use hub_core::{ErrorCode, MessageRecord, ProjectId, ProjectStatus, RecordKind, SessionId};
use serde::Serialize;
use serde_json::json;

/// `project_state`'s `data` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStateData {
    pub status: ProjectStatus,
    pub session_id: SessionId,
}

/// `error`'s `data` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub code: ErrorCode,
    pub message: String,
}

pub fn project_state(
    project_id: ProjectId,
    status: ProjectStatus,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> MessageRecord {
    let data = ProjectStateData { status, session_id };
    MessageRecord::new(
        RecordKind::ProjectState,
        project_id,
        serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        now,
    )
}

/// `agent_message`'s `data` is the agent's own record verbatim, relayed
/// unmodified.
pub fn agent_message(
    project_id: ProjectId,
    agent_record: serde_json::Value,
    now: DateTime<Utc>,
) -> MessageRecord {
    MessageRecord::new(RecordKind::AgentMessage, project_id, agent_record, now)
}

pub fn error(
    project_id: ProjectId,
    code: ErrorCode,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> MessageRecord {
    let data = ErrorData {
        code,
        message: message.into(),
    };
    MessageRecord::new(
        RecordKind::Error,
        project_id,
        serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        now,
    )
}

/// Synthesized once per lagging episode; `dropped` is a best-effort count
/// of records skipped since the last delivered record.
pub fn lagged(project_id: ProjectId, dropped: u64, now: DateTime<Utc>) -> MessageRecord {
    MessageRecord::new(RecordKind::Lagged, project_id, json!({ "dropped": dropped }), now)
}

pub fn server_shutdown(project_id: ProjectId, now: DateTime<Utc>) -> MessageRecord {
    MessageRecord::new(RecordKind::ServerShutdown, project_id, json!({}), now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_state_carries_status_and_session() {
        let rec = project_state(
            ProjectId::new(),
            ProjectStatus::Executing,
            SessionId::new("sess-1"),
            Utc::now(),
        );
        assert_eq!(rec.data["status"], "executing");
        assert_eq!(rec.data["session_id"], "sess-1");
    }

    #[test]
    fn error_carries_its_code() {
        let rec = error(ProjectId::new(), ErrorCode::Busy, "already running", Utc::now());
        assert_eq!(rec.data["code"], "busy");
    }
}
