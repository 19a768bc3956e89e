// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The agent's session identity.
//!
//! A session is not a separate tracked entity (see the Session Tracker in
//! `hub-daemon`, which owns the project -> session-id mapping); this is
//! just the opaque token the agent CLI hands back.

use serde::{Deserialize, Serialize};

/// An opaque, agent-assigned session token. May be empty when a project has
/// never completed an execution that emitted one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert!(SessionId::default().is_empty());
    }

    #[test]
    fn roundtrips_through_json() {
        let id = SessionId::new("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
