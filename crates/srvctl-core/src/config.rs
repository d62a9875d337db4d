// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Launcher configuration.
//!
//! Loaded from `<install>/etc/srvctl.toml` (or an explicit `--config` path)
//! and otherwise defaulted.
//!
//! ```toml
//! poll_interval_ms = 500
//! max_poll_attempts = 60
//! default_archive_format = "tar.gz"
//!
//! [launch_command]
//! program = "/opt/app/bin/server-launch"
//! args = ["--foreground"]
//! ```

use crate::archive::ArchiveFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Launcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Sleep between polling attempts (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Attempts made while waiting for a server to start or release its lock.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Attempts made while waiting for a stopped server's PID to disappear.
    #[serde(default = "default_process_exit_attempts")]
    pub process_exit_attempts: u32,

    /// Command socket connect timeout (milliseconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Command socket read timeout (milliseconds). Introspection can be slow.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Java dumps of each kind kept in the server output directory.
    #[serde(default = "default_max_retained_dumps")]
    pub max_retained_dumps: usize,

    /// Archive format used when `--archive` carries no extension.
    #[serde(default)]
    pub default_archive_format: Option<String>,

    /// Program used by `start` to launch the server process.
    #[serde(default)]
    pub launch_command: Option<LaunchCommand>,
}

/// External program that starts a server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_process_exit_attempts() -> u32 {
    20
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_read_timeout() -> u64 {
    120_000
}

fn default_max_retained_dumps() -> usize {
    10
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            process_exit_attempts: default_process_exit_attempts(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            max_retained_dumps: default_max_retained_dumps(),
            default_archive_format: None,
            launch_command: None,
        }
    }
}

impl LauncherConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.is_file() {
            tracing::debug!("Loading launcher config from {}", path.display());
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms cannot be 0".into()));
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_poll_attempts cannot be 0".into(),
            ));
        }
        if let Some(format) = &self.default_archive_format {
            if ArchiveFormat::from_name(format).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown default_archive_format '{}'",
                    format
                )));
            }
        }
        if let Some(launch) = &self.launch_command {
            if launch.program.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "launch_command.program cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
            process_exit_attempts: self.process_exit_attempts,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Configured archive format, falling back to the platform default.
    pub fn archive_format(&self) -> ArchiveFormat {
        self.default_archive_format
            .as_deref()
            .and_then(ArchiveFormat::from_name)
            .unwrap_or_else(ArchiveFormat::platform_default)
    }
}

/// Bounded polling parameters shared by every wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub process_exit_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        LauncherConfig::default().poll_settings()
    }
}
