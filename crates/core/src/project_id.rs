// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The project identity type.
//!
//! Unlike the other ids in [`crate::id`], a project id is UUID-shaped (36
//! characters, hyphenated) rather than a prefixed nanoid, matching the wire
//! contract in the external interface spec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A stable, opaque project identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectId(uuid::Uuid);

impl ProjectId {
    /// Generates a new random project id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a string does not parse as a [`ProjectId`].
#[derive(Debug, thiserror::Error)]
#[error("invalid project id: {0}")]
pub struct ParseProjectIdError(#[from] uuid::Error);

impl FromStr for ProjectId {
    type Err = ParseProjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

impl From<uuid::Uuid> for ProjectId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl Serialize for ProjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <&str>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_thirty_six_characters() {
        let id = ProjectId::new();
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn roundtrips_through_display_and_parse() {
        let id = ProjectId::new();
        let parsed: ProjectId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_non_uuid_strings() {
        assert!("not-a-uuid".parse::<ProjectId>().is_err());
    }

    #[test]
    fn roundtrips_through_json() {
        let id = ProjectId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ProjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
