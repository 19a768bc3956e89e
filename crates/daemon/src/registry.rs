// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The Project Registry: the one place that holds `Project` state, owns
//! each project's `MessageLog`, and drives the Executor for `execute`
//! requests. Every other component reaches a project only through here.
//!
//! `(I3)`: a project can have at most one live execution in flight, which
//! this module enforces simply by checking `ProjectStatus` under the same
//! lock that transitions it — there is no separate "in-flight" set to keep
//! in sync.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hub_core::validator::{self, AgentOptions};
use hub_core::{Clock, ConnectionId, MessageRecord, Project, ProjectDescriptor, ProjectId, ProjectStatus, SessionId};
use hub_storage::{metadata, LogConfig, LogError, MessageLog};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::executor::{self, AgentLauncher, ExecuteError, ExecuteOutcome};
use crate::hub::Hub;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Path(#[from] validator::PathError),
    #[error(transparent)]
    Nesting(#[from] validator::NestingError),
    #[error("project limit of {0} reached")]
    ProjectLimit(usize),
    #[error("project not found")]
    ProjectNotFound,
    #[error("project has a live execution in progress")]
    Busy,
    #[error(transparent)]
    Prompt(#[from] validator::PromptError),
    #[error(transparent)]
    Options(#[from] validator::OptionsError),
    #[error("no agent is running for this project")]
    NoActiveAgent,
    #[error("metadata error: {0}")]
    Metadata(#[from] metadata::MetadataError),
    #[error("log error: {0}")]
    Log(#[from] LogError),
}

impl RegistryError {
    pub fn code(&self) -> hub_core::ErrorCode {
        use hub_core::ErrorCode;
        match self {
            RegistryError::Path(e) => e.code(),
            RegistryError::Nesting(e) => e.code(),
            RegistryError::ProjectLimit(_) => ErrorCode::ProjectLimit,
            RegistryError::ProjectNotFound => ErrorCode::ProjectNotFound,
            RegistryError::Busy => ErrorCode::Busy,
            RegistryError::Prompt(e) => e.code(),
            RegistryError::Options(e) => e.code(),
            RegistryError::NoActiveAgent => ErrorCode::AgentNotFound,
            RegistryError::Metadata(e) => e.code(),
            RegistryError::Log(e) => e.code(),
        }
    }
}

/// Resource caps and behavioral knobs the Registry enforces; a narrowed
/// view of `config::Config` so this module doesn't depend on the whole
/// process configuration.
#[derive(Debug, Clone)]
pub struct RegistryLimits {
    pub max_projects: usize,
    pub max_prompt_chars: usize,
    pub execute_timeout: Duration,
    pub max_record_bytes: usize,
    pub cancel_grace: Duration,
    pub log_rotate_bytes: u64,
    pub log_retention_days: i64,
}

/// Clamps a client-supplied `limit` to the wire contract's documented
/// `1..1000` range, defaulting to the top of that range when absent.
fn clamp_limit(limit: Option<u32>) -> usize {
    limit.map(|l| l.clamp(1, 1000)).unwrap_or(1000) as usize
}

fn nonzero_exit_message(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("agent exited with status {code}"),
        None => "agent exited without a status (terminated by signal)".to_string(),
    }
}

struct ProjectEntry<C: Clock> {
    project: Project,
    log: MessageLog<C>,
    cancel: Option<CancellationToken>,
}

pub struct Registry<C: Clock> {
    data_root: PathBuf,
    clock: C,
    limits: RegistryLimits,
    launcher: AgentLauncher,
    hub: Arc<Hub<C>>,
    projects: Mutex<HashMap<ProjectId, Arc<Mutex<ProjectEntry<C>>>>>,
}

impl<C: Clock> Registry<C> {
    pub fn new(data_root: PathBuf, clock: C, limits: RegistryLimits, launcher: AgentLauncher, hub: Arc<Hub<C>>) -> Self {
        Self {
            data_root,
            clock,
            limits,
            launcher,
            hub,
            projects: Mutex::new(HashMap::new()),
        }
    }

    fn log_config(&self) -> LogConfig {
        LogConfig {
            rotate_bytes: self.limits.log_rotate_bytes,
            retention: chrono::Duration::days(self.limits.log_retention_days),
        }
    }

    /// Rehydrates every project found under `<data_root>/projects` into
    /// memory, always `idle`: no agent child process survives a restart.
    pub fn recover(&self) -> Result<usize, RegistryError> {
        let now = self.clock.now_utc();
        let metas = metadata::scan_projects(&self.data_root)?;
        let mut projects = self.projects.lock();
        let mut count = 0;
        for meta in metas {
            let project = Project::rehydrate(meta.id, meta.path, meta.created_at, now);
            let log = MessageLog::open_with_clock(
                metadata::messages_dir(&self.data_root, &meta.id),
                self.log_config(),
                self.clock.clone(),
            )?;
            projects.insert(
                meta.id,
                Arc::new(Mutex::new(ProjectEntry { project, log, cancel: None })),
            );
            count += 1;
        }
        Ok(count)
    }

    fn existing_paths(&self) -> Vec<PathBuf> {
        self.projects.lock().values().map(|e| e.lock().project.path.clone()).collect()
    }

    pub fn create_project(&self, raw_path: PathBuf) -> Result<ProjectDescriptor, RegistryError> {
        let canonical = validator::validate_path(&raw_path)?;
        let existing = self.existing_paths();
        validator::validate_nesting(&canonical, &existing)?;

        let mut projects = self.projects.lock();
        if projects.len() >= self.limits.max_projects {
            return Err(RegistryError::ProjectLimit(self.limits.max_projects));
        }

        let now = self.clock.now_utc();
        let project = Project::new(canonical, now);
        let dir = metadata::project_dir(&self.data_root, &project.id);
        metadata::write_metadata_atomic(&dir, &hub_core::ProjectMetadata::from(&project))?;
        let log = MessageLog::open_with_clock(
            metadata::messages_dir(&self.data_root, &project.id),
            self.log_config(),
            self.clock.clone(),
        )?;

        let descriptor = project.descriptor();
        projects.insert(project.id, Arc::new(Mutex::new(ProjectEntry { project, log, cancel: None })));
        Ok(descriptor)
    }

    pub fn list_projects(&self) -> Vec<ProjectDescriptor> {
        self.projects.lock().values().map(|e| e.lock().project.descriptor()).collect()
    }

    fn entry(&self, project_id: ProjectId) -> Result<Arc<Mutex<ProjectEntry<C>>>, RegistryError> {
        self.projects
            .lock()
            .get(&project_id)
            .cloned()
            .ok_or(RegistryError::ProjectNotFound)
    }

    pub fn delete_project(&self, project_id: ProjectId, purge: bool) -> Result<(), RegistryError> {
        let entry = self.entry(project_id)?;
        {
            let mut guard = entry.lock();
            if guard.project.status == ProjectStatus::Executing {
                return Err(RegistryError::Busy);
            }
            guard.log.close()?;
        }
        self.hub.unsubscribe_all_for_project(project_id);
        self.projects.lock().remove(&project_id);

        let dir = metadata::project_dir(&self.data_root, &project_id);
        metadata::delete_metadata(&dir)?;
        if purge {
            metadata::purge_project_dir(&dir)?;
        }
        Ok(())
    }

    /// Reads the replay window and subscribes `conn_id`, in that order, so
    /// no live broadcast can land between the snapshot and the
    /// subscription taking effect.
    pub fn join_project(
        &self,
        project_id: ProjectId,
        conn_id: ConnectionId,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<(ProjectDescriptor, Vec<MessageRecord>, mpsc::Receiver<MessageRecord>, CancellationToken), RegistryError>
    {
        let entry = self.entry(project_id)?;
        let (descriptor, replay) = {
            let guard = entry.lock();
            let replay = guard.log.read_since(since, clamp_limit(limit))?;
            (guard.project.descriptor(), replay)
        };
        let (rx, close) = self.hub.subscribe(project_id, conn_id);
        Ok((descriptor, replay, rx, close))
    }

    pub fn leave_project(&self, project_id: ProjectId, conn_id: ConnectionId) {
        self.hub.unsubscribe(project_id, conn_id);
    }

    /// Drops every subscription `conn_id` holds, across all projects.
    /// Called once when a connection disconnects.
    pub fn unsubscribe_connection(&self, conn_id: ConnectionId) {
        self.hub.unsubscribe_all(conn_id);
    }

    pub fn get_messages(
        &self,
        project_id: ProjectId,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<MessageRecord>, RegistryError> {
        let entry = self.entry(project_id)?;
        let guard = entry.lock();
        Ok(guard.log.read_since(since, clamp_limit(limit))?)
    }

    pub fn new_session(&self, project_id: ProjectId) -> Result<ProjectDescriptor, RegistryError> {
        let entry = self.entry(project_id)?;
        let mut guard = entry.lock();
        if guard.project.status == ProjectStatus::Executing {
            return Err(RegistryError::Busy);
        }
        guard.project.session_id = SessionId::empty();
        guard.project.touch(self.clock.now_utc());
        Ok(guard.project.descriptor())
    }

    pub fn kill_agent(&self, project_id: ProjectId) -> Result<(), RegistryError> {
        let entry = self.entry(project_id)?;
        let guard = entry.lock();
        match &guard.cancel {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(RegistryError::NoActiveAgent),
        }
    }

    /// Starts an execution. Validates inputs and the `(I3)` single-flight
    /// invariant synchronously, then spawns the executor and its consumer
    /// task and returns immediately; completion is observed only through
    /// the broadcast `project_state` records, not this call's return value.
    pub fn execute(
        self: &Arc<Self>,
        project_id: ProjectId,
        prompt: String,
        options: AgentOptions,
        new_session: bool,
    ) -> Result<(), RegistryError>
    where
        C: Clock,
    {
        validator::validate_prompt(&prompt, self.limits.max_prompt_chars)?;
        validator::validate_agent_options(&options)?;

        let entry = self.entry(project_id)?;
        let (project_path, session_id, cancel) = {
            let mut guard = entry.lock();
            if guard.project.status == ProjectStatus::Executing {
                return Err(RegistryError::Busy);
            }
            if new_session {
                guard.project.session_id = SessionId::empty();
            }
            guard.project.status = ProjectStatus::Executing;
            guard.project.touch(self.clock.now_utc());
            let cancel = CancellationToken::new();
            guard.cancel = Some(cancel.clone());
            (guard.project.path.clone(), guard.project.session_id.clone(), cancel)
        };

        let state_record = hub_wire::project_state(
            project_id,
            ProjectStatus::Executing,
            session_id.clone(),
            self.clock.now_utc(),
        );
        self.append_and_broadcast(&entry, project_id, state_record);

        let registry = Arc::clone(self);
        let entry_for_task = Arc::clone(&entry);
        tokio::spawn(async move {
            registry.drive_execution(project_id, entry_for_task, project_path, prompt, options, session_id, cancel).await;
        });

        Ok(())
    }

    async fn drive_execution(
        self: Arc<Self>,
        project_id: ProjectId,
        entry: Arc<Mutex<ProjectEntry<C>>>,
        project_path: PathBuf,
        prompt: String,
        options: AgentOptions,
        session_id: SessionId,
        cancel: CancellationToken,
    ) {
        let (tx, mut rx) = mpsc::channel::<MessageRecord>(64);
        let launcher = self.launcher.clone();
        let clock = self.clock.clone();
        let timeout = self.limits.execute_timeout;
        let max_record_bytes = self.limits.max_record_bytes;
        let cancel_grace = self.limits.cancel_grace;
        let resume = if session_id.is_empty() { None } else { Some(session_id.clone()) };

        let run_handle = tokio::spawn(async move {
            executor::run(
                &launcher,
                &clock,
                project_id,
                &project_path,
                &prompt,
                &options,
                resume.as_ref(),
                timeout,
                max_record_bytes,
                cancel_grace,
                cancel,
                tx,
            )
            .await
        });

        // Single consumer: every record the executor produces is logged
        // then broadcast, in that order, from this one task.
        while let Some(record) = rx.recv().await {
            self.append_and_broadcast(&entry, project_id, record);
        }

        let outcome = run_handle.await;
        let (final_status, final_session, error_notice): (_, _, Option<(hub_core::ErrorCode, String)>) = match outcome {
            Ok(Ok(ExecuteOutcome::Completed { session_id: sid })) => (ProjectStatus::Idle, sid, None),
            Ok(Ok(ExecuteOutcome::Killed)) => (ProjectStatus::Idle, None, None),
            Ok(Ok(ExecuteOutcome::NonzeroExit { session_id: sid, exit_code })) => (
                ProjectStatus::Error,
                sid,
                Some((hub_core::ErrorCode::Internal, nonzero_exit_message(exit_code))),
            ),
            Ok(Ok(ExecuteOutcome::TimedOut)) | Ok(Err(ExecuteError::Timeout)) => (
                ProjectStatus::Error,
                None,
                Some((hub_core::ErrorCode::Timeout, "execution exceeded its timeout".to_string())),
            ),
            Ok(Err(error)) => (ProjectStatus::Error, None, Some((error.code(), error.to_string()))),
            Err(_) => (
                ProjectStatus::Error,
                None,
                Some((hub_core::ErrorCode::Internal, "executor task did not complete".to_string())),
            ),
        };

        let now = self.clock.now_utc();
        let session_id = {
            let mut guard = entry.lock();
            guard.project.status = final_status;
            if let Some(sid) = final_session {
                guard.project.session_id = sid;
            }
            guard.project.touch(now);
            guard.cancel = None;
            guard.project.session_id.clone()
        };

        if let Some((code, message)) = error_notice {
            let error_record = hub_wire::error(project_id, code, message, now);
            self.append_and_broadcast(&entry, project_id, error_record);
        }

        let record = hub_wire::project_state(project_id, final_status, session_id, now);
        self.append_and_broadcast(&entry, project_id, record);
    }

    /// Cancels every project's in-flight execution, if any. Called once
    /// during graceful shutdown, before the Supervisor waits for
    /// connections to drain.
    pub fn cancel_all_executions(&self) {
        for entry in self.projects.lock().values() {
            if let Some(token) = &entry.lock().cancel {
                token.cancel();
            }
        }
    }

    /// Appends and broadcasts a `server_shutdown` record to every known
    /// project — including ones with no current subscribers — then closes
    /// every project's Message Log. Called once during graceful shutdown,
    /// after the accept loop has stopped.
    pub fn shutdown_all(&self, now: DateTime<Utc>) {
        let entries: Vec<Arc<Mutex<ProjectEntry<C>>>> = self.projects.lock().values().cloned().collect();
        for entry in &entries {
            let project_id = entry.lock().project.id;
            let record = hub_wire::server_shutdown(project_id, now);
            self.append_and_broadcast(entry, project_id, record);
        }
        for entry in &entries {
            let mut guard = entry.lock();
            if let Err(error) = guard.log.close() {
                tracing::warn!(%error, "failed to close message log during shutdown");
            }
        }
    }

    fn append_and_broadcast(&self, entry: &Arc<Mutex<ProjectEntry<C>>>, project_id: ProjectId, record: MessageRecord) {
        let appended = {
            let mut guard = entry.lock();
            match guard.log.append(record) {
                Ok(r) => r,
                Err(error) => {
                    tracing::warn!(%project_id, %error, "failed to append message record");
                    return;
                }
            }
        };
        self.hub.broadcast(project_id, appended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::FakeClock;

    fn limits() -> RegistryLimits {
        RegistryLimits {
            max_projects: 4,
            max_prompt_chars: 1024,
            execute_timeout: Duration::from_secs(30),
            max_record_bytes: 262_144,
            cancel_grace: Duration::from_secs(5),
            log_rotate_bytes: 8 * 1024 * 1024,
            log_retention_days: 30,
        }
    }

    fn registry(data_root: PathBuf) -> Arc<Registry<FakeClock>> {
        let clock = FakeClock::new();
        let hub = Arc::new(Hub::new(clock.clone(), 32, Duration::from_secs(5)));
        let launcher = AgentLauncher::new(PathBuf::from("/bin/true"));
        Arc::new(Registry::new(data_root, clock, limits(), launcher, hub))
    }

    #[test]
    fn create_then_list_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        let descriptor = reg.create_project(project_dir.path().to_path_buf()).unwrap();

        let listed = reg.list_projects();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, descriptor.id);
        assert_eq!(listed[0].status, ProjectStatus::Idle);
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        reg.create_project(project_dir.path().to_path_buf()).unwrap();

        let err = reg.create_project(project_dir.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, RegistryError::Nesting(validator::NestingError::Exists)));
    }

    #[test]
    fn project_limit_is_enforced() {
        let root = tempfile::tempdir().unwrap();
        let mut limits = limits();
        limits.max_projects = 1;
        let clock = FakeClock::new();
        let hub = Arc::new(Hub::new(clock.clone(), 32, Duration::from_secs(5)));
        let launcher = AgentLauncher::new(PathBuf::from("/bin/true"));
        let reg = Arc::new(Registry::new(root.path().to_path_buf(), clock, limits, launcher, hub));

        let d1 = tempfile::tempdir().unwrap();
        let d2 = tempfile::tempdir().unwrap();
        reg.create_project(d1.path().to_path_buf()).unwrap();
        let err = reg.create_project(d2.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, RegistryError::ProjectLimit(1)));
    }

    #[test]
    fn delete_removes_metadata_but_not_messages_without_purge() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        let descriptor = reg.create_project(project_dir.path().to_path_buf()).unwrap();

        reg.delete_project(descriptor.id, false).unwrap();
        assert!(reg.list_projects().is_empty());
        let dir = metadata::project_dir(root.path(), &descriptor.id);
        assert!(!dir.join("metadata.json").exists());
        assert!(dir.exists());
    }

    #[test]
    fn delete_with_purge_removes_the_whole_directory() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        let descriptor = reg.create_project(project_dir.path().to_path_buf()).unwrap();

        reg.delete_project(descriptor.id, true).unwrap();
        let dir = metadata::project_dir(root.path(), &descriptor.id);
        assert!(!dir.exists());
    }

    #[test]
    fn new_session_clears_session_id() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        let descriptor = reg.create_project(project_dir.path().to_path_buf()).unwrap();

        let updated = reg.new_session(descriptor.id).unwrap();
        assert!(updated.session_id.is_empty());
    }

    #[test]
    fn kill_agent_without_execution_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let project_dir = tempfile::tempdir().unwrap();
        let descriptor = reg.create_project(project_dir.path().to_path_buf()).unwrap();

        let err = reg.kill_agent(descriptor.id).unwrap_err();
        assert!(matches!(err, RegistryError::NoActiveAgent));
    }

    #[test]
    fn get_messages_on_unknown_project_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(root.path().to_path_buf());
        let err = reg.get_messages(ProjectId::new(), None, None).unwrap_err();
        assert!(matches!(err, RegistryError::ProjectNotFound));
    }
}
