// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `dump` of stopped and running servers.

mod common;

use common::{control, create_server, write_file, FakeServer};
use srvctl_core::dump::packager::{INSTALL_LISTING, SERVICE_DIR};
use srvctl_core::dump::{DumpError, DumperKind, JavaDumper};
use srvctl_core::command::descriptor::{CommandDescriptor, CommandPort};
use srvctl_core::{CommandListener, DumpOptions, DumpPackager, JavaDumpAction, ReturnCode, ServerLayout};
use std::net::{Ipv4Addr, TcpListener};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn zip_names(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn server(root: &Path) -> ServerLayout {
    let layout = create_server(root, "s1");
    write_file(layout.install_dir().join("lib/versions/runtime.properties"), "version=1");
    write_file(layout.config_dir().join("apps/big.war"), "war");
    write_file(layout.logs_dir().join("messages.log"), "started");
    layout
}

fn leftover_snapshots(layout: &ServerLayout) -> usize {
    fs::read_dir(layout.output_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("dump_"))
        .count()
}

#[test]
fn test_dump_stopped_server() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let archive = dir.path().join("s1-dump.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        java_dumps: vec![JavaDumpAction::Thread],
    };

    let rc = DumpPackager::new(control(&layout)).dump(&options);
    assert_eq!(rc, ReturnCode::ServerInactiveStatus);

    let names = zip_names(&archive);
    assert!(names.iter().any(|n| n == "server.xml"));
    assert!(names.iter().any(|n| n == "logs/messages.log"));
    assert!(names
        .iter()
        .any(|n| n.ends_with(&format!("{}/{}", SERVICE_DIR, INSTALL_LISTING))));
    assert!(names
        .iter()
        .any(|n| n.ends_with("service/versions/runtime.properties")));
    assert!(!names.iter().any(|n| n.starts_with("apps/")));
    assert_eq!(leftover_snapshots(&layout), 0);
}

#[test]
fn test_dump_missing_server() {
    let dir = tempdir().unwrap();
    let layout = ServerLayout::new(dir.path().join("wlp"), "ghost");
    let rc = DumpPackager::new(control(&layout)).dump(&DumpOptions::default());
    assert_eq!(rc, ReturnCode::ServerNotExistStatus);
}

#[test]
fn test_dump_archive_gets_default_extension() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let options = DumpOptions {
        archive: Some(dir.path().join("plain")),
        ..Default::default()
    };

    DumpPackager::new(control(&layout)).dump(&options);
    assert!(dir.path().join("plain.zip").is_file());
    assert!(!dir.path().join("plain.zip.part").exists());
}

struct ThreadDumper;

impl JavaDumper for ThreadDumper {
    fn kind(&self) -> DumperKind {
        DumperKind::HotSpot
    }

    fn dump(&self, action: JavaDumpAction, target: &Path) -> Result<PathBuf, DumpError> {
        if action != JavaDumpAction::Thread {
            return Err(DumpError::Unsupported(action));
        }
        fs::write(target, "\"main\" #1\n")?;
        Ok(target.to_path_buf())
    }
}

#[test]
fn test_dump_running_server_collects_java_dumps() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::builder(layout.clone(), Arc::new(FakeServer::default()))
        .dumper(Arc::new(ThreadDumper))
        .start()
        .unwrap();

    let archive = dir.path().join("running.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        java_dumps: vec![JavaDumpAction::Thread],
    };
    let rc = DumpPackager::new(control).dump(&options);
    assert_eq!(rc, ReturnCode::Ok);

    let names = zip_names(&archive);
    assert!(names.iter().any(|n| n.ends_with("/introspection.txt")));
    let thread_dump = names
        .iter()
        .find(|n| !n.contains('/') && JavaDumpAction::Thread.matches_file(n))
        .expect("thread dump in archive");

    // collected dumps and the snapshot are removed afterwards
    assert!(!layout.output_dir().join(thread_dump).exists());
    assert_eq!(leftover_snapshots(&layout), 0);
}

#[test]
fn test_unproduced_java_dump_degrades_code() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::builder(layout.clone(), Arc::new(FakeServer::default()))
        .dumper(Arc::new(ThreadDumper))
        .start()
        .unwrap();

    let archive = dir.path().join("heap.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        java_dumps: vec![JavaDumpAction::Heap],
    };
    let rc = DumpPackager::new(control).dump(&options);
    assert_eq!(rc, ReturnCode::ErrorServerDump);
    assert!(archive.is_file());
}

struct HeapDumper;

impl JavaDumper for HeapDumper {
    fn kind(&self) -> DumperKind {
        DumperKind::HotSpot
    }

    fn dump(&self, action: JavaDumpAction, target: &Path) -> Result<PathBuf, DumpError> {
        if action != JavaDumpAction::Heap {
            return Err(DumpError::Unsupported(action));
        }
        fs::write(target, "heap")?;
        Ok(target.to_path_buf())
    }
}

fn heap_dumps(layout: &ServerLayout) -> usize {
    fs::read_dir(layout.output_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| JavaDumpAction::Heap.matches_file(&e.file_name().to_string_lossy()))
        .count()
}

#[test]
fn test_failed_archive_keeps_java_dumps() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::builder(layout.clone(), Arc::new(FakeServer::default()))
        .dumper(Arc::new(HeapDumper))
        .start()
        .unwrap();

    fs::write(dir.path().join("blocker"), "not a directory").unwrap();
    let options = DumpOptions {
        archive: Some(dir.path().join("blocker/out.zip")),
        java_dumps: vec![JavaDumpAction::Heap],
    };
    let rc = DumpPackager::new(control).dump(&options);
    assert_eq!(rc, ReturnCode::ErrorServerDump);

    assert_eq!(heap_dumps(&layout), 1);
    assert_eq!(leftover_snapshots(&layout), 0);
}

#[test]
fn test_archived_heap_dump_is_removed() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::builder(layout.clone(), Arc::new(FakeServer::default()))
        .dumper(Arc::new(HeapDumper))
        .start()
        .unwrap();

    let archive = dir.path().join("heap-ok.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        java_dumps: vec![JavaDumpAction::Heap],
    };
    assert_eq!(DumpPackager::new(control).dump(&options), ReturnCode::Ok);
    assert!(archive.is_file());
    assert_eq!(heap_dumps(&layout), 0);
}

#[test]
fn test_dump_running_but_unreachable_server() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();

    // a port nobody listens on any more
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    CommandDescriptor::new("tok", CommandPort::Active(port))
        .write(&layout.command_file())
        .unwrap();

    let archive = dir.path().join("unreachable.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        ..Default::default()
    };
    let rc = DumpPackager::new(control).dump(&options);
    assert_eq!(rc, ReturnCode::ServerUnknownStatus);

    let names = zip_names(&archive);
    assert!(names.iter().any(|n| n == "server.xml"));
    assert!(names.iter().any(|n| n == "logs/messages.log"));
}

#[test]
fn test_dump_with_command_port_disabled() {
    let dir = tempdir().unwrap();
    let layout = server(dir.path());
    let control = control(&layout);
    let _guard = control.lock().acquire().unwrap();
    let _listener = CommandListener::disabled(&layout).unwrap();

    let archive = dir.path().join("disabled.zip");
    let options = DumpOptions {
        archive: Some(archive.clone()),
        ..Default::default()
    };
    let rc = DumpPackager::new(control).dump(&options);
    assert_eq!(rc, ReturnCode::ServerCommandPortDisabledStatus);
    assert!(zip_names(&archive).iter().any(|n| n == "server.xml"));
}
