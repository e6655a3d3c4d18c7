//! Daemon configuration, loaded from `config/global.toml`.
//!
//! Every field has a default so a missing or partial file still yields a
//! working configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::SupervisorSettings;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ScriptsConfig {
    #[serde(default = "default_scripts_dir")]
    pub dir: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dir: default_scripts_dir(),
        }
    }
}

/// Supervision tunables. Restart policy defaults: a fixed 5s backoff and a
/// cap of 5 automatic restarts per 60s window.
#[derive(Deserialize, Debug, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default = "default_restart_backoff_secs")]
    pub restart_backoff_secs: u64,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            log_buffer_size: default_log_buffer_size(),
            startup_timeout_secs: default_startup_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            restart_backoff_secs: default_restart_backoff_secs(),
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn to_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            interpreter: self.interpreter.clone(),
            log_buffer_size: self.log_buffer_size,
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            restart_backoff: Duration::from_secs(self.restart_backoff_secs),
            max_restarts: self.max_restarts,
            restart_window: Duration::from_secs(self.restart_window_secs),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_log_buffer_size() -> usize {
    crate::supervisor::log_buffer::DEFAULT_LOG_BUFFER
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_restart_backoff_secs() -> u64 {
    5
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_window_secs() -> u64 {
    60
}

impl GlobalConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config/global.toml")
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        let cfg = toml::from_str(&content)?;
        Ok(cfg)
    }
}
