// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The project: identity, canonical path, and the small bit of mutable
//! state the Executor and Registry are each allowed to touch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::project_id::ProjectId;
use crate::session::SessionId;

/// `(I3)`: `status` is `Executing` iff the Executor holds a live child
/// process for this project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Idle,
    Executing,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Idle => "idle",
            ProjectStatus::Executing => "executing",
            ProjectStatus::Error => "error",
        }
    }
}

/// A project: an execution context rooted at a filesystem path, with a
/// message log and a current agent session.
///
/// Ownership (see the data model): the Registry owns this struct; the
/// Executor alone transitions `status` and writes `session_id`; `last_active`
/// is bumped by whichever component observes activity, but only forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    pub status: ProjectStatus,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Project {
    /// Creates a freshly registered project, `idle` with no session.
    pub fn new(path: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id: ProjectId::new(),
            path,
            status: ProjectStatus::Idle,
            session_id: SessionId::empty(),
            created_at: now,
            last_active: now,
        }
    }

    /// Rehydrates a project recovered from metadata at startup: always
    /// `idle`, always with an empty session id, per the Registry's recovery
    /// contract (no prior agent child process survives a restart).
    pub fn rehydrate(id: ProjectId, path: PathBuf, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            path,
            status: ProjectStatus::Idle,
            session_id: SessionId::empty(),
            created_at,
            last_active: now,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `(I4)`: bumps `last_active` only if `at` is later than the current
    /// value, so the field is monotonic non-decreasing even if called with
    /// stale timestamps.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_active {
            self.last_active = at;
        }
    }

    pub fn descriptor(&self) -> ProjectDescriptor {
        ProjectDescriptor {
            id: self.id,
            path: self.path.clone(),
            status: self.status,
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

/// A read-only snapshot of a project, suitable for wire responses
/// (`project_create`, `project_list`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub id: ProjectId,
    pub path: PathBuf,
    pub status: ProjectStatus,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// On-disk metadata record (`projects/<id>/metadata.json`), the persisted
/// subset of [`Project`] needed to rehydrate it at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub id: ProjectId,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl From<&Project> for ProjectMetadata {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id,
            path: p.path.clone(),
            created_at: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn touch_never_moves_last_active_backwards() {
        let now = Utc::now();
        let mut project = Project::new(PathBuf::from("/tmp/p"), now);
        project.touch(now - Duration::seconds(5));
        assert_eq!(project.last_active, now);
        project.touch(now + Duration::seconds(5));
        assert_eq!(project.last_active, now + Duration::seconds(5));
    }

    #[test]
    fn rehydrate_is_always_idle_with_empty_session() {
        let id = ProjectId::new();
        let created = Utc::now();
        let project = Project::rehydrate(id, PathBuf::from("/tmp/p"), created, created);
        assert_eq!(project.status, ProjectStatus::Idle);
        assert!(project.session_id.is_empty());
    }

    #[test]
    fn metadata_roundtrips_through_json() {
        let project = Project::new(PathBuf::from("/tmp/p"), Utc::now());
        let meta = ProjectMetadata::from(&project);
        let json = serde_json::to_string(&meta).unwrap();
        let back: ProjectMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, meta.id);
        assert_eq!(back.path, meta.path);
    }
}
