// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The stable, wire-facing error code taxonomy.
//!
//! Internal error enums (validator, log, executor, registry, connection,
//! lifecycle) are richer than this; each implements `fn code(&self) ->
//! ErrorCode` to collapse onto one of these values before it reaches a
//! client frame. Variant names and their `serde` spelling are part of the
//! wire contract and must not change once a client depends on them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPath,
    PathTraversal,
    ProjectExists,
    ProjectNesting,
    ProjectNotFound,
    ProjectLimit,
    MessageTooLarge,
    SchemaViolation,
    Busy,
    Timeout,
    AgentNotFound,
    AgentSpawnFailed,
    ConnectionLimit,
    Internal,
}

impl ErrorCode {
    /// The wire-stable string, matching the `serde` spelling exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPath => "invalid_path",
            ErrorCode::PathTraversal => "path_traversal",
            ErrorCode::ProjectExists => "project_exists",
            ErrorCode::ProjectNesting => "project_nesting",
            ErrorCode::ProjectNotFound => "project_not_found",
            ErrorCode::ProjectLimit => "project_limit",
            ErrorCode::MessageTooLarge => "message_too_large",
            ErrorCode::SchemaViolation => "schema_violation",
            ErrorCode::Busy => "busy",
            ErrorCode::Timeout => "timeout",
            ErrorCode::AgentNotFound => "agent_not_found",
            ErrorCode::AgentSpawnFailed => "agent_spawn_failed",
            ErrorCode::ConnectionLimit => "connection_limit",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_snake_case() {
        let json = serde_json::to_string(&ErrorCode::ProjectNotFound).unwrap();
        assert_eq!(json, "\"project_not_found\"");
    }

    #[test]
    fn as_str_matches_serde_spelling() {
        for code in [
            ErrorCode::InvalidPath,
            ErrorCode::PathTraversal,
            ErrorCode::ProjectExists,
            ErrorCode::ProjectNesting,
            ErrorCode::ProjectNotFound,
            ErrorCode::ProjectLimit,
            ErrorCode::MessageTooLarge,
            ErrorCode::SchemaViolation,
            ErrorCode::Busy,
            ErrorCode::Timeout,
            ErrorCode::AgentNotFound,
            ErrorCode::AgentSpawnFailed,
            ErrorCode::ConnectionLimit,
            ErrorCode::Internal,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
