// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle operations against an in-process server.

mod common;

use common::{control, create_server, test_config, FakeServer};
use srvctl_core::command::descriptor::{CommandDescriptor, CommandPort};
use srvctl_core::config::LaunchCommand;
use srvctl_core::{CommandListener, ReturnCode, ServerControl, ServerLayout, ServerLockState};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_status() {
    let dir = tempdir().unwrap();
    let missing = ServerLayout::new(dir.path().join("wlp"), "nope");
    assert_eq!(control(&missing).status(), ReturnCode::ServerNotExistStatus);

    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    assert_eq!(control.status(), ReturnCode::ServerInactiveStatus);

    let guard = control.lock().acquire().unwrap();
    assert_eq!(control.lock().state(), ServerLockState::HeldByThisProcess);
    assert_eq!(control.status(), ReturnCode::ServerActiveStatus);
    drop(guard);
    assert_eq!(control.status(), ReturnCode::ServerInactiveStatus);
}

#[test]
fn test_stop_without_lock_file_makes_no_connection() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    CommandDescriptor::new("tok", CommandPort::Active(port))
        .write(&layout.command_file())
        .unwrap();

    assert_eq!(control(&layout).stop(false), ReturnCode::RedundantActionStatus);
    let accepted = listener.accept();
    assert!(matches!(accepted, Err(ref e) if e.kind() == ErrorKind::WouldBlock));
}

#[test]
fn test_stop_with_stale_lock_file() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    drop(control.lock().acquire().unwrap());
    assert!(control.lock().lock_file_exists());

    assert_eq!(control.stop(false), ReturnCode::RedundantActionStatus);
}

#[test]
fn test_stop_running_server() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);

    let server = Arc::new(FakeServer::holding(control.lock().acquire().unwrap()));
    let _listener = CommandListener::builder(layout.clone(), server.clone())
        .start()
        .unwrap();

    assert_eq!(control.stop(true), ReturnCode::Ok);
    assert_eq!(server.calls(), vec!["stop force=true"]);
    assert!(!control.is_running());
}

#[test]
fn test_stop_missing_server() {
    let dir = tempdir().unwrap();
    let layout = ServerLayout::new(dir.path().join("wlp"), "ghost");
    assert_eq!(control(&layout).stop(false), ReturnCode::ServerNotExistStatus);
}

#[test]
fn test_pause_and_resume() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    assert_eq!(control.pause(None), ReturnCode::ServerInactiveStatus);

    let _guard = control.lock().acquire().unwrap();
    let server = Arc::new(FakeServer::default());
    let _listener = CommandListener::builder(layout.clone(), server.clone())
        .start()
        .unwrap();

    assert_eq!(control.pause(Some("web,batch")), ReturnCode::Ok);
    assert_eq!(control.resume(Some("web")), ReturnCode::Ok);
    assert_eq!(server.calls(), vec!["pause web,batch", "resume web"]);
}

#[test]
fn test_start_status_waits_for_listener() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    let guard = control.lock().acquire().unwrap();

    let starter = {
        let layout = layout.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            let server = Arc::new(FakeServer::holding(guard));
            CommandListener::builder(layout, server).start().unwrap()
        })
    };

    assert_eq!(control.start_status(), ReturnCode::Ok);
    drop(starter.join().unwrap());
}

#[test]
fn test_start_status_with_disabled_port() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    let guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::disabled(&layout).unwrap();

    assert_eq!(control.start_status(), ReturnCode::Ok);
    drop(guard);
}

#[test]
fn test_start_status_fails_once_lock_is_gone() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);

    assert_eq!(control.start_status(), ReturnCode::ErrorServerStart);
}

#[test]
fn test_start_requires_launch_command() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    assert_eq!(control(&layout).start(), ReturnCode::BadArgument);
}

#[cfg(unix)]
#[test]
fn test_start_reports_early_exit() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let mut config = test_config();
    config.launch_command = Some(LaunchCommand {
        program: "sh".into(),
        args: vec!["-c".into(), "echo starting ${server.name}; exit 3".into()],
    });
    let control = ServerControl::new(layout.clone(), config);

    assert_eq!(control.start(), ReturnCode::ErrorServerStart);
    let console = std::fs::read_to_string(layout.logs_dir().join("console.log")).unwrap();
    assert!(console.contains("starting s1"));
}

#[test]
fn test_start_when_already_running() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();

    assert_eq!(control.start(), ReturnCode::RedundantActionStatus);
}

#[test]
fn test_stop_times_out_while_lock_held() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);

    // the server acknowledges stop but never releases its lock
    let _guard = control.lock().acquire().unwrap();
    let server = Arc::new(FakeServer::default());
    let _listener = CommandListener::builder(layout.clone(), server.clone())
        .start()
        .unwrap();

    assert_eq!(control.stop(false), ReturnCode::ErrorServerStop);
    assert_eq!(server.calls(), vec!["stop force=false"]);
    assert!(control.is_running());
}

#[test]
fn test_pause_target_with_delimiter_rejected() {
    let dir = tempdir().unwrap();
    let layout = create_server(dir.path(), "s1");
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let server = Arc::new(FakeServer::default());
    let _listener = CommandListener::builder(layout.clone(), server.clone())
        .start()
        .unwrap();

    assert_eq!(control.pause(Some("web#batch")), ReturnCode::BadArgument);
    assert_eq!(control.resume(Some("#")), ReturnCode::BadArgument);
    assert!(server.calls().is_empty());
}
