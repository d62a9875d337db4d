// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Java dump kinds and server dump packaging.
//!
//! How a dump is actually taken belongs to the runtime; this crate only sees
//! it through [`JavaDumper`]. What it does own is the naming of dump files,
//! the `ACTION=path` location file, and the dump archive workflow in
//! [`packager`].

pub mod fallback;
pub mod listing;
pub mod locations;
pub mod packager;

pub use locations::{parse_locations, read_locations, write_locations, DumpLocations};
pub use packager::{DumpOptions, DumpPackager};

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Timestamp format shared by dump directories and archives.
pub const DUMP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";

/// Dump errors.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown java dump action '{0}'")]
    UnknownAction(String),

    #[error("{0} dumps are not supported by this runtime")]
    Unsupported(JavaDumpAction),

    #[error("archive error: {0}")]
    Archive(#[from] crate::archive::ArchiveError),
}

/// Kinds of java dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JavaDumpAction {
    Heap,
    Thread,
    System,
}

impl JavaDumpAction {
    pub const ALL: [JavaDumpAction; 3] = [Self::Heap, Self::Thread, Self::System];

    /// Wire and location-file name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heap => "HEAP",
            Self::Thread => "THREAD",
            Self::System => "SYSTEM",
        }
    }

    pub fn parse(name: &str) -> Result<Self, DumpError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "HEAP" => Ok(Self::Heap),
            "THREAD" => Ok(Self::Thread),
            "SYSTEM" => Ok(Self::System),
            _ => Err(DumpError::UnknownAction(name.trim().to_string())),
        }
    }

    /// Parse a comma-separated list, dropping repeats.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, DumpError> {
        let mut actions = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let action = Self::parse(item)?;
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    pub fn join(actions: &[Self]) -> String {
        actions
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Heap => "heapdump",
            Self::Thread => "javacore",
            Self::System => "core",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Heap => "phd",
            Self::Thread => "txt",
            Self::System => "dmp",
        }
    }

    /// Whether `file_name` looks like a dump of this kind.
    pub fn matches_file(&self, file_name: &str) -> bool {
        file_name.starts_with(self.file_prefix())
            && file_name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext == self.file_extension())
    }
}

impl fmt::Display for JavaDumpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime family a [`JavaDumper`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumperKind {
    /// HotSpot diagnostic bean.
    HotSpot,
    /// J9 `com.ibm.jvm.Dump` static API.
    Legacy,
    /// J9 dump API with explicit file targets.
    Modern,
}

/// Takes java dumps inside the server process.
///
/// Selected once at server start and handed to the command listener.
pub trait JavaDumper: Send + Sync {
    fn kind(&self) -> DumperKind;

    /// Write a dump of `action` kind, preferably to `target`. Returns the
    /// file actually written, or [`DumpError::Unsupported`].
    fn dump(&self, action: JavaDumpAction, target: &Path) -> Result<PathBuf, DumpError>;
}

/// Unique dump file names within one process.
#[derive(Debug)]
pub struct DumpFileNamer {
    pid: u32,
    seq: AtomicU32,
}

impl DumpFileNamer {
    pub fn new() -> Self {
        Self::with_pid(std::process::id())
    }

    pub fn with_pid(pid: u32) -> Self {
        Self {
            pid,
            seq: AtomicU32::new(1),
        }
    }

    /// `<prefix>.<yyyyMMdd>.<HHmmss>.<pid>.<seq>.<ext>`
    pub fn next_name(&self, action: JavaDumpAction, now: DateTime<Local>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}.{}.{}.{:04}.{}",
            action.file_prefix(),
            now.format("%Y%m%d.%H%M%S"),
            self.pid,
            seq,
            action.file_extension()
        )
    }

    pub fn next_path(&self, dir: &Path, action: JavaDumpAction) -> PathBuf {
        dir.join(self.next_name(action, Local::now()))
    }
}

impl Default for DumpFileNamer {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time in [`DUMP_TIMESTAMP_FORMAT`].
pub fn dump_timestamp() -> String {
    Local::now().format(DUMP_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_parse_list() {
        let actions = JavaDumpAction::parse_list("heap, THREAD,heap").unwrap();
        assert_eq!(actions, vec![JavaDumpAction::Heap, JavaDumpAction::Thread]);
        assert_eq!(JavaDumpAction::join(&actions), "HEAP,THREAD");
        assert!(JavaDumpAction::parse_list("").unwrap().is_empty());
        assert!(matches!(
            JavaDumpAction::parse_list("heap,bogus"),
            Err(DumpError::UnknownAction(a)) if a == "bogus"
        ));
    }

    #[test]
    fn test_matches_file() {
        assert!(JavaDumpAction::Thread.matches_file("javacore.20260101.101010.42.0001.txt"));
        assert!(!JavaDumpAction::Thread.matches_file("javacore.20260101.101010.42.0001.phd"));
        assert!(JavaDumpAction::Heap.matches_file("heapdump.1.phd"));
        assert!(JavaDumpAction::System.matches_file("core.1.dmp"));
        assert!(!JavaDumpAction::System.matches_file("console.log"));
    }

    #[test]
    fn test_namer_format() {
        let namer = DumpFileNamer::with_pid(42);
        let now = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            namer.next_name(JavaDumpAction::Heap, now),
            "heapdump.20260304.050607.42.0001.phd"
        );
        assert_eq!(
            namer.next_name(JavaDumpAction::Thread, now),
            "javacore.20260304.050607.42.0002.txt"
        );
    }

    #[test]
    fn test_namer_is_unique_across_threads() {
        let namer = Arc::new(DumpFileNamer::with_pid(1));
        let now = Local.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let namer = namer.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| namer.next_name(JavaDumpAction::Heap, now))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(names.insert(name));
            }
        }
        assert_eq!(names.len(), 400);
    }
}
