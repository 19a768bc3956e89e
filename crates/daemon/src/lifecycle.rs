// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Startup and recovery: acquire the lock file first (so two daemons never
//! share a data root), rehydrate every project from disk, and bind the
//! listening socket last, after every step that can still fail.
//!
//! On any failure other than `LockFailed`, the files this attempt created
//! are removed; a `LockFailed` means another daemon owns them, so nothing
//! here is ours to clean up.

use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;

use fs2::FileExt;
use hub_core::SystemClock;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::executor::AgentLauncher;
use crate::hub::Hub;
use crate::registry::{Registry, RegistryLimits};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to acquire the daemon lock: another hubd may already be running")]
    LockFailed(#[source] std::io::Error),
    #[error("failed to bind {0}:{1}: {2}")]
    BindFailed(String, u16, #[source] std::io::Error),
    #[error("recovery failed: {0}")]
    Recovery(#[from] crate::registry::RegistryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the daemon's runtime singletons plus the lock file, which must
/// stay open (and therefore locked) for the whole process lifetime.
pub struct DaemonState {
    #[allow(dead_code)]
    lock_file: File,
    pub registry: Arc<Registry<SystemClock>>,
    pub hub: Arc<Hub<SystemClock>>,
    pub listener: TcpListener,
}

pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        Err(error) => {
            if !matches!(error, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(error)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.data_root)?;

    // Acquire the lock before truncating anything: if another daemon holds
    // it, its PID file must survive untouched.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(config.lock_path())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    std::fs::write(config.version_path(), env!("CARGO_PKG_VERSION"))?;
    std::fs::create_dir_all(config.projects_root())?;

    let hub = Arc::new(Hub::new(SystemClock, config.queue_depth, config.lag_grace));

    let launcher = AgentLauncher::new(config.agent_bin.clone());
    let limits = RegistryLimits {
        max_projects: config.max_projects,
        max_prompt_chars: config.max_prompt_chars,
        execute_timeout: config.execute_timeout,
        max_record_bytes: config.max_record_bytes,
        cancel_grace: config.cancel_grace,
        log_rotate_bytes: config.log_rotate_bytes,
        log_retention_days: config.log_retention_days,
    };
    let registry = Arc::new(Registry::new(config.data_root.clone(), SystemClock, limits, launcher, Arc::clone(&hub)));
    let recovered = registry.recover()?;
    tracing::info!(recovered, "rehydrated projects from disk");

    // Bind last: only once every fallible step above has succeeded.
    let bind_addr = format!("{}:{}", config.listen_addr, config.listen_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr.clone(), config.listen_port, e))?;

    Ok(DaemonState { lock_file, registry, hub, listener })
}

fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(config.version_path());
}
