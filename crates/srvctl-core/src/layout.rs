// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! On-disk layout of an installation and one of its servers.
//!
//! ```text
//! <install>/                      runtime (bin/, lib/, etc/)
//! <install>/usr/                  user dir (WLP_USER_DIR overrides)
//! <user>/servers/<name>/          server config dir
//! <output>/<name>/                server output dir (WLP_OUTPUT_DIR overrides <output>)
//! <output>/<name>/workarea/       lock file, command descriptor, challenge dir
//! <output>/.pid/<name>.pid        process id of the running server
//! ```

use std::path::{Path, PathBuf};

pub const USER_DIR_ENV: &str = "WLP_USER_DIR";
pub const OUTPUT_DIR_ENV: &str = "WLP_OUTPUT_DIR";

const LOCK_FILE: &str = ".sLock";
const COMMAND_FILE: &str = ".sCommand";
const COMMAND_AUTH_DIR: &str = ".sCommandAuth";
const DUMP_LOCATIONS_FILE: &str = ".javaDumpLocations";
const CONFIG_FILE: &str = "etc/srvctl.toml";

/// Resolved paths for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    server_name: String,
    install_dir: PathBuf,
    user_dir: PathBuf,
    output_root: PathBuf,
}

impl ServerLayout {
    /// Layout with the default user and output directories under `install_dir`.
    pub fn new(install_dir: impl Into<PathBuf>, server_name: impl Into<String>) -> Self {
        let install_dir = install_dir.into();
        let user_dir = install_dir.join("usr");
        let output_root = user_dir.join("servers");
        Self {
            server_name: server_name.into(),
            install_dir,
            user_dir,
            output_root,
        }
    }

    /// Layout honouring `WLP_USER_DIR` and `WLP_OUTPUT_DIR`.
    pub fn from_env(install_dir: impl Into<PathBuf>, server_name: impl Into<String>) -> Self {
        let mut layout = Self::new(install_dir, server_name);
        if let Some(user) = std::env::var_os(USER_DIR_ENV).filter(|v| !v.is_empty()) {
            layout = layout.with_user_dir(PathBuf::from(user));
        }
        if let Some(output) = std::env::var_os(OUTPUT_DIR_ENV).filter(|v| !v.is_empty()) {
            layout = layout.with_output_root(PathBuf::from(output));
        }
        layout
    }

    /// Override the user dir; the output root follows unless set explicitly later.
    pub fn with_user_dir(mut self, user_dir: impl Into<PathBuf>) -> Self {
        let user_dir = user_dir.into();
        if self.output_root == self.user_dir.join("servers") {
            self.output_root = user_dir.join("servers");
        }
        self.user_dir = user_dir;
        self
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.user_dir.join("servers")
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.user_dir.join("shared")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.servers_dir().join(&self.server_name)
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.server_name)
    }

    pub fn workarea_dir(&self) -> PathBuf {
        self.output_dir().join("workarea")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir().join("logs")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.workarea_dir().join(LOCK_FILE)
    }

    pub fn command_file(&self) -> PathBuf {
        self.workarea_dir().join(COMMAND_FILE)
    }

    pub fn command_auth_dir(&self) -> PathBuf {
        self.workarea_dir().join(COMMAND_AUTH_DIR)
    }

    /// File in which the server reports where it wrote java dumps.
    pub fn dump_locations_file(&self) -> PathBuf {
        self.workarea_dir().join(DUMP_LOCATIONS_FILE)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.output_root
            .join(".pid")
            .join(format!("{}.pid", self.server_name))
    }

    /// Snapshot directory for a dump taken at `timestamp`.
    pub fn dump_dir(&self, timestamp: &str) -> PathBuf {
        self.output_dir().join(format!("dump_{}", timestamp))
    }

    pub fn config_file(&self) -> PathBuf {
        self.install_dir.join(CONFIG_FILE)
    }

    /// Whether the server has been created.
    pub fn server_exists(&self) -> bool {
        self.config_dir().is_dir()
    }

    /// Whether the user dir lives inside the install dir.
    pub fn user_dir_in_install(&self) -> bool {
        self.user_dir.starts_with(&self.install_dir)
    }

    /// Read the recorded process id, if any.
    pub fn read_pid(&self) -> Option<u32> {
        let text = std::fs::read_to_string(self.pid_file()).ok()?;
        text.trim().parse().ok()
    }
}
