// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle operations against one server.
//!
//! Every operation first looks at the lock file, then at the lock itself,
//! and only then talks to the server through the command protocol. Polling
//! lives here so callers get a single [`ReturnCode`] back.

use crate::command::{CommandPort, ServerCommandClient, DELIM};
use crate::config::{LauncherConfig, PollSettings};
use crate::dump::locations::{read_locations, DumpLocations};
use crate::dump::JavaDumpAction;
use crate::layout::{ServerLayout, OUTPUT_DIR_ENV, USER_DIR_ENV};
use crate::lock::ServerLock;
use crate::process::{self, ProcessSignal};
use crate::return_code::ReturnCode;
use std::fs;
use std::process::{Child, Command, Stdio};
use tracing::{debug, error, info, warn};

/// Environment variable carrying the server name to launched processes.
pub const SERVER_NAME_ENV: &str = "SRVCTL_SERVER_NAME";
/// Environment variable carrying the install dir to launched processes.
pub const INSTALL_DIR_ENV: &str = "SRVCTL_INSTALL_DIR";

/// Lifecycle front end for one server.
#[derive(Debug, Clone)]
pub struct ServerControl {
    layout: ServerLayout,
    config: LauncherConfig,
    lock: ServerLock,
    client: ServerCommandClient,
}

impl ServerControl {
    pub fn new(layout: ServerLayout, config: LauncherConfig) -> Self {
        let lock = ServerLock::new(&layout, config.poll_settings());
        let client = ServerCommandClient::new(&layout, &config);
        Self {
            layout,
            config,
            lock,
            client,
        }
    }

    pub fn layout(&self) -> &ServerLayout {
        &self.layout
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn lock(&self) -> &ServerLock {
        &self.lock
    }

    pub fn client(&self) -> &ServerCommandClient {
        &self.client
    }

    fn poll(&self) -> PollSettings {
        self.config.poll_settings()
    }

    /// Lock file first, then the lock.
    pub fn is_running(&self) -> bool {
        self.lock.lock_file_exists() && self.lock.test_server_running()
    }

    pub fn status(&self) -> ReturnCode {
        if !self.layout.server_exists() {
            return ReturnCode::ServerNotExistStatus;
        }
        if self.is_running() {
            ReturnCode::ServerActiveStatus
        } else {
            ReturnCode::ServerInactiveStatus
        }
    }

    pub fn stop(&self, force: bool) -> ReturnCode {
        let name = self.layout.server_name();
        if !self.layout.server_exists() {
            return ReturnCode::ServerNotExistStatus;
        }
        if !self.lock.lock_file_exists() {
            info!("Server {} is not running", name);
            return ReturnCode::RedundantActionStatus;
        }
        if !self.lock.test_server_running() {
            info!("Server {} is not running (stale lock file)", name);
            return ReturnCode::RedundantActionStatus;
        }

        let pid = self.layout.read_pid();
        let rc = match self.client.descriptor() {
            Ok(descriptor) if descriptor.port == CommandPort::Disabled => {
                info!("Command port disabled for {}, stopping by signal", name);
                self.stop_by_signal(pid, force)
            }
            Err(_) if pid.is_some() => {
                warn!("No command descriptor for running server {}, stopping by signal", name);
                self.stop_by_signal(pid, force)
            }
            _ => self.client.stop_server(force),
        };

        if rc != ReturnCode::Ok {
            return rc;
        }
        self.wait_after_stop(pid)
    }

    fn stop_by_signal(&self, pid: Option<u32>, force: bool) -> ReturnCode {
        let Some(pid) = pid else {
            error!(
                "Cannot stop server {}: command port disabled and no pid recorded",
                self.layout.server_name()
            );
            return ReturnCode::ErrorServerStop;
        };
        let signal = if force {
            ProcessSignal::Kill
        } else {
            ProcessSignal::Terminate
        };
        match process::send_signal(pid, signal) {
            Ok(()) => ReturnCode::Ok,
            Err(e) => {
                error!("Failed to signal process {}: {}", pid, e);
                ReturnCode::ErrorServerStop
            }
        }
    }

    fn wait_after_stop(&self, pid: Option<u32>) -> ReturnCode {
        let name = self.layout.server_name();
        if !self.lock.wait_for_stop() {
            error!("Timed out waiting for server {} to release its lock", name);
            return ReturnCode::ErrorServerStop;
        }
        if let Some(pid) = pid.filter(|p| *p != std::process::id()) {
            if !process::wait_for_exit(pid, &self.poll()) {
                error!("Server {} process {} did not exit", name, pid);
                return ReturnCode::ErrorServerStop;
            }
        }
        info!("Server {} stopped", name);
        ReturnCode::Ok
    }

    /// Launch the configured command, then wait for the server to come up.
    pub fn start(&self) -> ReturnCode {
        let name = self.layout.server_name();
        if !self.layout.server_exists() {
            return ReturnCode::ServerNotExistStatus;
        }
        if self.is_running() {
            info!("Server {} is already running", name);
            return ReturnCode::RedundantActionStatus;
        }
        let Some(launch) = &self.config.launch_command else {
            error!("No launch_command configured");
            return ReturnCode::BadArgument;
        };

        let mut child = match self.spawn(&launch.program, &launch.args) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch {}: {}", launch.program, e);
                return ReturnCode::LaunchException;
            }
        };
        info!("Starting server {} (process {})", name, child.id());

        let poll = self.poll();
        let mut attempts = 0;
        while !self.is_running() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    error!("Server {} exited during startup: {}", name, status);
                    return ReturnCode::ErrorServerStart;
                }
                Ok(None) => {}
                Err(e) => warn!("Cannot query launched process: {}", e),
            }
            if attempts >= poll.max_attempts {
                error!("Timed out waiting for server {} to take its lock", name);
                return ReturnCode::ErrorServerStart;
            }
            attempts += 1;
            std::thread::sleep(poll.interval);
        }

        self.start_status()
    }

    fn spawn(&self, program: &str, args: &[String]) -> std::io::Result<Child> {
        let logs = self.layout.logs_dir();
        fs::create_dir_all(&logs)?;
        let console = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(logs.join("console.log"))?;
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace("${server.name}", self.layout.server_name()))
            .collect();

        Command::new(program)
            .args(&args)
            .env(SERVER_NAME_ENV, self.layout.server_name())
            .env(INSTALL_DIR_ENV, self.layout.install_dir())
            .env(USER_DIR_ENV, self.layout.user_dir())
            .env(OUTPUT_DIR_ENV, self.layout.output_root())
            .stdin(Stdio::null())
            .stdout(console.try_clone()?)
            .stderr(console)
            .spawn()
    }

    /// Wait for a starting server to answer `status:start`.
    ///
    /// The lock must stay held the whole time; losing it means the server
    /// died during startup.
    pub fn start_status(&self) -> ReturnCode {
        let name = self.layout.server_name();
        let poll = self.poll();

        let mut attempts = 0;
        while !self.client.is_valid() {
            if !self.lock.test_server_running() {
                error!("Server {} stopped while starting", name);
                return ReturnCode::ErrorServerStart;
            }
            if attempts >= poll.max_attempts {
                error!("Timed out waiting for server {} command descriptor", name);
                return ReturnCode::ErrorServerStart;
            }
            attempts += 1;
            std::thread::sleep(poll.interval);
        }

        for attempt in 0..poll.max_attempts {
            let rc = self.client.start_status_probe(false);
            if rc != ReturnCode::StartStatusAction {
                return self.started(rc);
            }
            debug!("Server {} not answering yet (attempt {})", name, attempt + 1);
            if !self.lock.test_server_running() {
                error!("Server {} stopped while starting", name);
                return ReturnCode::ErrorServerStart;
            }
            std::thread::sleep(poll.interval);
        }
        let rc = self.client.start_status_probe(true);
        self.started(rc)
    }

    fn started(&self, rc: ReturnCode) -> ReturnCode {
        let name = self.layout.server_name();
        match rc {
            ReturnCode::ServerCommandPortDisabledStatus if self.lock.test_server_running() => {
                warn!(
                    "Command port disabled, cannot confirm server {} finished starting",
                    name
                );
                ReturnCode::Ok
            }
            ReturnCode::ServerCommandPortDisabledStatus => ReturnCode::ErrorServerStart,
            ReturnCode::Ok => {
                info!("Server {} started", name);
                ReturnCode::Ok
            }
            other => other,
        }
    }

    pub fn pause(&self, target: Option<&str>) -> ReturnCode {
        if let Some(rc) = check_target(target).or_else(|| self.require_running()) {
            return rc;
        }
        self.client.pause(target)
    }

    pub fn resume(&self, target: Option<&str>) -> ReturnCode {
        if let Some(rc) = check_target(target).or_else(|| self.require_running()) {
            return rc;
        }
        self.client.resume(target)
    }

    /// Ask the server for java dumps and report where they were written.
    pub fn java_dump(&self, actions: &[JavaDumpAction]) -> (ReturnCode, DumpLocations) {
        if let Some(rc) = self.require_running() {
            return (rc, DumpLocations::new());
        }
        let locations_file = self.layout.dump_locations_file();
        let _ = fs::remove_file(&locations_file);

        let rc = self.client.java_dump(actions);
        if rc != ReturnCode::Ok {
            return (rc, DumpLocations::new());
        }

        let locations = match read_locations(&locations_file) {
            Ok(locations) => locations,
            Err(e) => {
                warn!("Server did not report dump locations: {}", e);
                return (rc, DumpLocations::new());
            }
        };
        for (action, path) in &locations {
            if path.is_empty() {
                warn!("{} dumps are not supported by the server runtime", action);
            } else {
                info!("{} dump written to {}", action, path);
            }
        }
        (rc, locations)
    }

    fn require_running(&self) -> Option<ReturnCode> {
        if !self.layout.server_exists() {
            return Some(ReturnCode::ServerNotExistStatus);
        }
        if !self.is_running() {
            info!("Server {} is not running", self.layout.server_name());
            return Some(ReturnCode::ServerInactiveStatus);
        }
        None
    }
}

/// Targets travel as one command argument and cannot carry the delimiter.
fn check_target(target: Option<&str>) -> Option<ReturnCode> {
    match target {
        Some(t) if t.contains(DELIM) => {
            error!("Invalid target '{}': '{}' is not allowed", t, DELIM);
            Some(ReturnCode::BadArgument)
        }
        _ => None,
    }
}
