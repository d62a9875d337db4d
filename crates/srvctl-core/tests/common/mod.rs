// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(dead_code)]

use srvctl_core::lock::ServerLockGuard;
use srvctl_core::{CommandHandler, LauncherConfig, ReturnCode, ServerControl, ServerLayout};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fast polling so failing waits end quickly.
pub fn test_config() -> LauncherConfig {
    LauncherConfig {
        poll_interval_ms: 10,
        max_poll_attempts: 100,
        process_exit_attempts: 50,
        connect_timeout_ms: 2_000,
        read_timeout_ms: 5_000,
        default_archive_format: Some("zip".into()),
        ..Default::default()
    }
}

/// Install tree with one created server.
pub fn create_server(root: &Path, name: &str) -> ServerLayout {
    let layout = ServerLayout::new(root.join("wlp"), name);
    fs::create_dir_all(layout.config_dir()).unwrap();
    fs::write(layout.config_dir().join("server.xml"), "<server/>").unwrap();
    layout
}

pub fn control(layout: &ServerLayout) -> ServerControl {
    ServerControl::new(layout.clone(), test_config())
}

pub fn write_file(path: PathBuf, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// In-process server: releases its lock on `stop`.
#[derive(Default)]
pub struct FakeServer {
    pub guard: Mutex<Option<ServerLockGuard>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn holding(guard: ServerLockGuard) -> Self {
        Self {
            guard: Mutex::new(Some(guard)),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandHandler for FakeServer {
    fn stop(&self, force: bool) -> ReturnCode {
        self.calls.lock().unwrap().push(format!("stop force={}", force));
        self.guard.lock().unwrap().take();
        ReturnCode::Ok
    }

    fn introspect(&self, dump_dir: &Path) -> ReturnCode {
        self.calls.lock().unwrap().push("introspect".into());
        fs::write(dump_dir.join("introspection.txt"), "threads: 12\n").unwrap();
        ReturnCode::Ok
    }

    fn pause(&self, targets: &[String]) -> ReturnCode {
        self.calls.lock().unwrap().push(format!("pause {}", targets.join(",")));
        ReturnCode::Ok
    }

    fn resume(&self, targets: &[String]) -> ReturnCode {
        self.calls.lock().unwrap().push(format!("resume {}", targets.join(",")));
        ReturnCode::Ok
    }
}
