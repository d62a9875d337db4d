// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `dump` workflow: snapshot, introspect, collect, archive, clean up.

use super::fallback::{prune_dumps, signal_thread_dump};
use super::listing::write_install_listing;
use super::locations::read_locations;
use super::{dump_timestamp, JavaDumpAction};
use crate::archive::builder::resolve_metadata;
use crate::archive::{ArchiveBuilder, ArchiveFormat, DirectoryEntry, EntryConfig};
use crate::lifecycle::ServerControl;
use crate::pattern::{normalize_path, quote, DefaultPolicy, PatternError, PatternFilter};
use crate::return_code::ReturnCode;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Name of the service directory inside the snapshot.
pub const SERVICE_DIR: &str = "service";
/// Checksum listing written into the service directory.
pub const INSTALL_LISTING: &str = "installDirListing.txt";

/// Options of one dump run.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Output archive; defaults to `<output>/<server>.dump-<ts>.<ext>`.
    pub archive: Option<PathBuf>,
    pub java_dumps: Vec<JavaDumpAction>,
}

/// Drives a server dump into one archive.
#[derive(Debug, Clone)]
pub struct DumpPackager {
    control: ServerControl,
}

/// Removes a path when dropped.
struct Cleanup(Vec<PathBuf>);

impl Drop for Cleanup {
    fn drop(&mut self) {
        for path in &self.0 {
            let result = if path.is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match result {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
    }
}

impl DumpPackager {
    pub fn new(control: ServerControl) -> Self {
        Self { control }
    }

    pub fn dump(&self, options: &DumpOptions) -> ReturnCode {
        let layout = self.control.layout();
        let name = layout.server_name();
        if !layout.server_exists() {
            return ReturnCode::ServerNotExistStatus;
        }

        let timestamp = dump_timestamp();
        let snapshot = layout.dump_dir(&timestamp);
        if let Err(e) = fs::create_dir_all(&snapshot) {
            error!("Cannot create {}: {}", snapshot.display(), e);
            return ReturnCode::ErrorServerDump;
        }
        let _cleanup = Cleanup(vec![snapshot.clone()]);

        let (mut rc, java_dump_files) = if self.control.is_running() {
            self.introspect(&timestamp, &options.java_dumps)
        } else {
            info!("Server {} is not running; dumping static state only", name);
            if !options.java_dumps.is_empty() {
                warn!("Java dumps need a running server; skipped");
            }
            (ReturnCode::ServerInactiveStatus, Vec::new())
        };

        self.copy_service_files(&snapshot.join(SERVICE_DIR));
        if let Err(e) = write_install_listing(
            layout.install_dir(),
            layout.user_dir(),
            &snapshot.join(SERVICE_DIR).join(INSTALL_LISTING),
        ) {
            warn!("Cannot write install listing: {}", e);
        }

        let archive = self.archive_path(options.archive.as_deref(), &timestamp);
        match self.write_archive(&archive, &snapshot, &java_dump_files) {
            Ok(()) => {
                info!("Server {} dump complete in {}", name, archive.display());
                drop(Cleanup(java_dump_files));
            }
            Err(e) => {
                error!("Server {} dump failed: {}", name, e);
                for dump in &java_dump_files {
                    warn!("Java dump kept at {}", dump.display());
                }
                rc = ReturnCode::ErrorServerDump;
            }
        }
        rc
    }

    /// Introspect through the command port; fall back to a signal dump when unreachable.
    fn introspect(&self, timestamp: &str, actions: &[JavaDumpAction]) -> (ReturnCode, Vec<PathBuf>) {
        let layout = self.control.layout();
        let locations_file = layout.dump_locations_file();
        let _ = fs::remove_file(&locations_file);

        let rc = self.control.client().introspect_server(timestamp, actions);
        match rc {
            ReturnCode::Ok => {
                if actions.is_empty() {
                    return (rc, Vec::new());
                }
                let locations = match read_locations(&locations_file) {
                    Ok(locations) => locations,
                    Err(e) => {
                        warn!("Server did not report dump locations: {}", e);
                        return (ReturnCode::ErrorServerDump, Vec::new());
                    }
                };
                let mut rc = ReturnCode::Ok;
                let mut files = Vec::new();
                for action in actions {
                    match locations.get(action).map(String::as_str) {
                        Some(path) if !path.is_empty() && Path::new(path).is_file() => {
                            files.push(PathBuf::from(path));
                        }
                        _ => {
                            warn!("{} dump was not produced by the server", action);
                            rc = ReturnCode::ErrorServerDump;
                        }
                    }
                }
                (rc, files)
            }
            ReturnCode::ServerCommandPortDisabledStatus => {
                warn!("Command port disabled; introspection data unavailable");
                (rc, self.fallback_dumps(actions))
            }
            ReturnCode::ServerInactiveStatus | ReturnCode::ServerUnknownStatus => {
                warn!("Server is running but unreachable; introspection data unavailable");
                (ReturnCode::ServerUnknownStatus, self.fallback_dumps(actions))
            }
            other => (other, Vec::new()),
        }
    }

    fn fallback_dumps(&self, actions: &[JavaDumpAction]) -> Vec<PathBuf> {
        if !actions.contains(&JavaDumpAction::Thread) {
            return Vec::new();
        }
        let layout = self.control.layout();
        let Some(pid) = layout.read_pid() else {
            warn!("No pid recorded; cannot request a thread dump");
            return Vec::new();
        };
        let output_dir = layout.output_dir();
        let dirs = vec![output_dir.clone(), layout.install_dir().to_path_buf()];
        let poll = self.control.config().poll_settings();

        let dump = match signal_thread_dump(pid, &dirs, &poll) {
            Ok(dump) => dump,
            Err(e) => {
                warn!("Thread dump request failed: {}", e);
                None
            }
        };
        let keep = self.control.config().max_retained_dumps;
        if let Err(e) = prune_dumps(&output_dir, JavaDumpAction::Thread, keep) {
            warn!("Cannot prune old thread dumps: {}", e);
        }
        dump.into_iter().collect()
    }

    /// Version and fix inventory plus configuration shared by servers.
    fn copy_service_files(&self, service: &Path) {
        let layout = self.control.layout();
        let install = layout.install_dir();
        let sources = [
            (install.join("lib").join("versions"), service.join("versions")),
            (install.join("lib").join("fixes"), service.join("fixes")),
            (install.join("etc"), service.join("etc")),
            (layout.shared_dir().join("config"), service.join("shared").join("config")),
        ];
        for (from, to) in &sources {
            if !from.is_dir() {
                debug!("No {} to copy", from.display());
                continue;
            }
            if let Err(e) = copy_tree(from, to) {
                warn!("Cannot copy {}: {}", from.display(), e);
            }
        }
    }

    fn archive_path(&self, requested: Option<&Path>, timestamp: &str) -> PathBuf {
        let layout = self.control.layout();
        let format = self.control.config().archive_format();
        match requested {
            Some(path) if ArchiveFormat::from_path(path).is_some() => path.to_path_buf(),
            Some(path) => {
                let mut name = path.as_os_str().to_os_string();
                name.push(".");
                name.push(format.extension());
                PathBuf::from(name)
            }
            None => layout.output_dir().join(format!(
                "{}.dump-{}.{}",
                layout.server_name(),
                timestamp,
                format.extension()
            )),
        }
    }

    fn write_archive(&self, archive: &Path, snapshot: &Path, java_dumps: &[PathBuf]) -> Result<(), DumpArchiveError> {
        let layout = self.control.layout();
        let format = ArchiveFormat::from_path(archive)
            .ok_or_else(|| DumpArchiveError::Format(archive.to_path_buf()))?;
        let part = part_path(archive);

        let config_dir = layout.config_dir();
        let base = quote(normalize_path(&config_dir).trim_end_matches('/'));
        let filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault)
            .exclude(&format!("^{}/(apps|dropins|workarea|logs)(/|$)", base))?
            .exclude(&format!("^{}/dump_[^/]*(/|$)", base))?
            .exclude(&format!(
                "/{}\\.dump-[^/]*$",
                quote(layout.server_name())
            ))?
            .exclude_file(archive)
            .exclude_file(&part)
            .build();

        let mut builder = ArchiveBuilder::new(&part, format);
        builder.add_entry_config(DirectoryEntry::new("", &config_dir).with_filter(filter));
        builder.add_entry_config(DirectoryEntry::new("logs", layout.logs_dir()));
        if let Some(name) = snapshot.file_name() {
            builder.add_entry_config(DirectoryEntry::new(
                name.to_string_lossy().into_owned(),
                snapshot,
            ));
        }
        for dump in java_dumps {
            if let Some(name) = dump.file_name() {
                builder.add_entry_config(EntryConfig::file(name.to_string_lossy().into_owned(), dump));
            }
        }

        let summary = builder.create()?;
        fs::rename(&part, archive).map_err(DumpArchiveError::Io)?;
        debug!(
            "Dump archive has {} files in {} directories",
            summary.files, summary.directories
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum DumpArchiveError {
    #[error("unsupported archive format for {0}")]
    Format(PathBuf),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Archive(#[from] crate::archive::ArchiveError),
    #[error("I/O error: {0}")]
    Io(io::Error),
}

/// `<archive>.part`, renamed to the final name once complete.
pub fn part_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Recursive copy that keeps going past unreadable entries.
///
/// Linked directories are copied once; special files are skipped.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    let mut visited: HashSet<PathBuf> = fs::canonicalize(from).into_iter().collect();
    copy_dir(from, to, &mut visited)
}

fn copy_dir(from: &Path, to: &Path, visited: &mut HashSet<PathBuf>) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let result = match resolve_metadata(&source) {
            Ok(meta) if meta.is_dir() => match fs::canonicalize(&source) {
                Ok(real) if visited.insert(real.clone()) => copy_dir(&source, &target, visited),
                Ok(_) => {
                    debug!("Not copying {} again", source.display());
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Ok(meta) if meta.is_file() => fs::copy(&source, &target).map(|_| ()),
            Ok(_) => {
                debug!("Skipping special file {}", source.display());
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Cannot copy {}: {}", source.display(), e);
        }
    }
    Ok(())
}
