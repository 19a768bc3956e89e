// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The message record: the one envelope shape that is both a log entry and
//! a broadcast unit (client-facing `type` is this record's `kind`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project_id::ProjectId;

/// Tags a [`MessageRecord`]'s semantics. Serializes under the wire's `type`
/// field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A project status transition (`idle`, `executing`, `error`).
    ProjectState,
    /// A record relayed verbatim from the agent CLI's own output stream.
    AgentMessage,
    /// A protocol or server error, carrying a stable [`crate::error::ErrorCode`].
    Error,
    /// Synthesized once when a subscriber's outbound queue overflows.
    Lagged,
    /// Broadcast to every project when the server begins shutdown.
    ServerShutdown,
}

/// A single JSON envelope: immutable once appended, ordering within a
/// project equal to file-append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(
        kind: RecordKind,
        project_id: ProjectId,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            project_id: Some(project_id),
            data,
            timestamp,
        }
    }

    /// Serializes as one newline-terminated JSON line for log storage.
    pub fn to_log_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_log_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}
