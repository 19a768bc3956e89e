// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Atomic project metadata persistence and the startup recovery scan.
//!
//! Layout: `<data_root>/projects/<id>/metadata.json`, written via
//! write-to-temp-file then rename so a reader never observes a torn file.

use std::fs;
use std::path::{Path, PathBuf};

use hub_core::ProjectMetadata;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed metadata: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl MetadataError {
    pub fn code(&self) -> hub_core::ErrorCode {
        hub_core::ErrorCode::Internal
    }
}

pub fn project_dir(data_root: &Path, id: &hub_core::ProjectId) -> PathBuf {
    data_root.join("projects").join(id.to_string())
}

pub fn messages_dir(data_root: &Path, id: &hub_core::ProjectId) -> PathBuf {
    project_dir(data_root, id).join("messages")
}

/// Writes `metadata.json` via temp-file-then-rename so a concurrent reader
/// (the startup scan of a second process, or an operator) never observes a
/// partially written file.
pub fn write_metadata_atomic(dir: &Path, meta: &ProjectMetadata) -> Result<(), MetadataError> {
    fs::create_dir_all(dir)?;
    let final_path = dir.join("metadata.json");
    let tmp_path = dir.join("metadata.json.tmp");
    let json = serde_json::to_vec_pretty(meta)?;
    fs::write(&tmp_path, &json)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

pub fn delete_metadata(dir: &Path) -> Result<(), MetadataError> {
    let meta_path = dir.join("metadata.json");
    if meta_path.exists() {
        fs::remove_file(meta_path)?;
    }
    Ok(())
}

/// Removes the whole project directory, including its message log. Only
/// called when a client opts into `purge=true` on delete.
pub fn purge_project_dir(dir: &Path) -> Result<(), MetadataError> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

/// Startup scan: every well-formed `metadata.json` under
/// `<data_root>/projects/*` rehydrates a project. Malformed or unreadable
/// entries are logged and skipped rather than failing the whole scan.
pub fn scan_projects(data_root: &Path) -> Result<Vec<ProjectMetadata>, MetadataError> {
    let projects_dir = data_root.join("projects");
    if !projects_dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in fs::read_dir(&projects_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let meta_path = entry.path().join("metadata.json");
        if !meta_path.exists() {
            continue;
        }
        match fs::read(&meta_path) {
            Ok(bytes) => match serde_json::from_slice::<ProjectMetadata>(&bytes) {
                Ok(meta) => out.push(meta),
                Err(error) => {
                    tracing::warn!(path = %meta_path.display(), %error, "skipping malformed project metadata");
                }
            },
            Err(error) => {
                tracing::warn!(path = %meta_path.display(), %error, "failed reading project metadata");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hub_core::ProjectId;

    fn sample(id: ProjectId) -> ProjectMetadata {
        ProjectMetadata {
            id,
            path: std::path::PathBuf::from("/tmp/p1"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn write_then_scan_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let id = ProjectId::new();
        let dir = project_dir(root.path(), &id);
        write_metadata_atomic(&dir, &sample(id)).unwrap();

        let scanned = scan_projects(root.path()).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, id);
    }

    #[test]
    fn scan_skips_malformed_metadata() {
        let root = tempfile::tempdir().unwrap();
        let dir = project_dir(root.path(), &ProjectId::new());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("metadata.json"), b"not json").unwrap();

        let scanned = scan_projects(root.path()).unwrap();
        assert!(scanned.is_empty());
    }

    #[test]
    fn scan_on_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let scanned = scan_projects(&root.path().join("does-not-exist")).unwrap();
        assert!(scanned.is_empty());
    }

    #[test]
    fn delete_then_purge() {
        let root = tempfile::tempdir().unwrap();
        let id = ProjectId::new();
        let dir = project_dir(root.path(), &id);
        write_metadata_atomic(&dir, &sample(id)).unwrap();
        delete_metadata(&dir).unwrap();
        assert!(!dir.join("metadata.json").exists());
        assert!(dir.exists());

        purge_project_dir(&dir).unwrap();
        assert!(!dir.exists());
    }
}
