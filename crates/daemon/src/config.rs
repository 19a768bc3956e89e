// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Process configuration, built once at startup from the environment.
//!
//! Every knob has a default except the ones that depend on `$HOME`; an
//! unresolvable data root is the only way `Config::load` fails on its own
//! (other fatal conditions, like an unwritable data root or a bad port,
//! surface later as I/O errors from `lifecycle::startup`).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a data root: set HUB_DATA_ROOT or HOME")]
    NoDataRoot,
    #[error("invalid {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Every environment-configurable knob, read once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub listen_port: u16,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub data_root: PathBuf,
    pub agent_bin: PathBuf,
    pub execute_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub max_connections: usize,
    pub max_projects: usize,
    pub log_rotate_bytes: u64,
    pub log_retention_days: i64,
    pub log_level: String,
    pub max_record_bytes: usize,
    pub max_message_bytes: usize,
    pub max_prompt_chars: usize,
    pub queue_depth: usize,
    pub lag_grace: Duration,
    pub shutdown_grace: Duration,
    pub cancel_grace: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let data_root = match std::env::var("HUB_DATA_ROOT") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_data_root()?,
        };

        Ok(Self {
            listen_addr: env_string("HUB_LISTEN_ADDR", "0.0.0.0"),
            listen_port: env_parsed("HUB_LISTEN_PORT", 7420)?,
            tls_cert: std::env::var("HUB_TLS_CERT").ok().map(PathBuf::from),
            tls_key: std::env::var("HUB_TLS_KEY").ok().map(PathBuf::from),
            data_root,
            agent_bin: PathBuf::from(env_string("HUB_AGENT_BIN", "agent")),
            execute_timeout: Duration::from_secs(env_parsed("HUB_EXECUTE_TIMEOUT_SECS", 300)?),
            heartbeat_interval: Duration::from_secs(env_parsed("HUB_HEARTBEAT_SECS", 15)?),
            max_connections: env_parsed("HUB_MAX_CONNECTIONS", 1024)?,
            max_projects: env_parsed("HUB_MAX_PROJECTS", 256)?,
            log_rotate_bytes: env_parsed("HUB_LOG_ROTATE_BYTES", 8_388_608)?,
            log_retention_days: env_parsed("HUB_LOG_RETENTION_DAYS", 30)?,
            log_level: env_string("HUB_LOG_LEVEL", "info"),
            max_record_bytes: env_parsed("HUB_MAX_RECORD_BYTES", 262_144)?,
            max_message_bytes: env_parsed("HUB_MAX_MESSAGE_BYTES", 1_048_576)?,
            max_prompt_chars: env_parsed("HUB_MAX_PROMPT_CHARS", 32_768)?,
            queue_depth: env_parsed("HUB_QUEUE_DEPTH", 256)?,
            lag_grace: Duration::from_secs(env_parsed("HUB_LAG_GRACE_SECS", 10)?),
            shutdown_grace: Duration::from_secs(env_parsed("HUB_SHUTDOWN_GRACE_SECS", 10)?),
            cancel_grace: Duration::from_secs(env_parsed("HUB_CANCEL_GRACE_SECS", 5)?),
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_root.join("hub.lock")
    }

    pub fn version_path(&self) -> PathBuf {
        self.data_root.join("hub.version")
    }

    pub fn projects_root(&self) -> PathBuf {
        self.data_root.join("projects")
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => {
            raw.parse().map_err(|_| ConfigError::InvalidValue(key_leak(key), raw))
        }
        _ => Ok(default),
    }
}

/// Env var names are all `'static` string literals at call sites; this just
/// threads that through `env_parsed`'s generic error path without cloning.
fn key_leak(key: &str) -> &'static str {
    match key {
        "HUB_LISTEN_PORT" => "HUB_LISTEN_PORT",
        "HUB_EXECUTE_TIMEOUT_SECS" => "HUB_EXECUTE_TIMEOUT_SECS",
        "HUB_HEARTBEAT_SECS" => "HUB_HEARTBEAT_SECS",
        "HUB_MAX_CONNECTIONS" => "HUB_MAX_CONNECTIONS",
        "HUB_MAX_PROJECTS" => "HUB_MAX_PROJECTS",
        "HUB_LOG_ROTATE_BYTES" => "HUB_LOG_ROTATE_BYTES",
        "HUB_LOG_RETENTION_DAYS" => "HUB_LOG_RETENTION_DAYS",
        "HUB_MAX_RECORD_BYTES" => "HUB_MAX_RECORD_BYTES",
        "HUB_MAX_MESSAGE_BYTES" => "HUB_MAX_MESSAGE_BYTES",
        "HUB_MAX_PROMPT_CHARS" => "HUB_MAX_PROMPT_CHARS",
        "HUB_QUEUE_DEPTH" => "HUB_QUEUE_DEPTH",
        "HUB_LAG_GRACE_SECS" => "HUB_LAG_GRACE_SECS",
        "HUB_SHUTDOWN_GRACE_SECS" => "HUB_SHUTDOWN_GRACE_SECS",
        "HUB_CANCEL_GRACE_SECS" => "HUB_CANCEL_GRACE_SECS",
        _ => "HUB_CONFIG",
    }
}

/// Resolve `$XDG_STATE_HOME/hub` or `$HOME/.local/state/hub`.
fn default_data_root() -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("hub"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoDataRoot)?;
    Ok(PathBuf::from(home).join(".local/state/hub"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn data_root_defaults_from_xdg_state_home() {
        std::env::remove_var("HUB_DATA_ROOT");
        std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-state-test");
        let config = Config::load().unwrap();
        assert_eq!(config.data_root, PathBuf::from("/tmp/xdg-state-test/hub"));
        std::env::remove_var("XDG_STATE_HOME");
    }

    #[test]
    #[serial]
    fn explicit_data_root_wins() {
        std::env::set_var("HUB_DATA_ROOT", "/tmp/explicit-hub-root");
        let config = Config::load().unwrap();
        assert_eq!(config.data_root, PathBuf::from("/tmp/explicit-hub-root"));
        std::env::remove_var("HUB_DATA_ROOT");
    }

    #[test]
    #[serial]
    fn invalid_port_is_rejected() {
        std::env::set_var("HUB_DATA_ROOT", "/tmp/explicit-hub-root");
        std::env::set_var("HUB_LISTEN_PORT", "not-a-port");
        let err = Config::load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("HUB_LISTEN_PORT", _)));
        std::env::remove_var("HUB_LISTEN_PORT");
        std::env::remove_var("HUB_DATA_ROOT");
    }
}
