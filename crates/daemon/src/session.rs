// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Session-id extraction from agent output.
//!
//! The agent CLI is free to emit session identifiers however it likes on its
//! own stdout stream; the only contract the hub relies on is a single JSON
//! object line shaped like `{"session_id": "..."}` somewhere in the stream.
//! Tracking which project currently holds which session id is not this
//! module's job — `hub_core::Project::session_id` is the one cell of truth,
//! mutated in place by `registry::Registry`. This module is pure extraction.

use hub_core::SessionId;
use serde_json::Value;

/// Looks for a `session_id` string field on a parsed JSON line. Returns
/// `None` for anything that isn't an object, or whose field is missing,
/// empty, or not a string.
pub fn extract_session_id(value: &Value) -> Option<SessionId> {
    let raw = value.get("session_id")?.as_str()?;
    if raw.is_empty() {
        return None;
    }
    Some(SessionId::from(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_session_id_from_object() {
        let line = json!({"session_id": "sess-abc123", "kind": "status"});
        assert_eq!(extract_session_id(&line).unwrap().as_str(), "sess-abc123");
    }

    #[test]
    fn ignores_lines_without_session_id() {
        let line = json!({"kind": "text", "data": "hello"});
        assert!(extract_session_id(&line).is_none());
    }

    #[test]
    fn ignores_non_string_session_id() {
        let line = json!({"session_id": 42});
        assert!(extract_session_id(&line).is_none());
    }

    #[test]
    fn ignores_empty_session_id() {
        let line = json!({"session_id": ""});
        assert!(extract_session_id(&line).is_none());
    }

    #[test]
    fn ignores_non_object_values() {
        let line = json!(["session_id", "sess-1"]);
        assert!(extract_session_id(&line).is_none());
    }
}
