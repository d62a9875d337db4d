// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Signal-driven thread dumps for servers that cannot be reached.

use super::{DumpError, JavaDumpAction};
use crate::config::PollSettings;
use crate::process::{self, ProcessSignal};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Existing dump files of `action` kind in `dirs`.
pub fn existing_dumps(dirs: &[PathBuf], action: JavaDumpAction) -> HashSet<PathBuf> {
    let mut found = HashSet::new();
    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if action.matches_file(&name.to_string_lossy()) {
                found.insert(entry.path());
            }
        }
    }
    found
}

/// Send `SIGQUIT` to `pid` and wait for a new `javacore*.txt` in `dirs`.
///
/// Returns `None` when the runtime wrote nothing recognisable in time, as
/// HotSpot does when it prints the dump to stdout.
pub fn signal_thread_dump(
    pid: u32,
    dirs: &[PathBuf],
    poll: &PollSettings,
) -> Result<Option<PathBuf>, DumpError> {
    let before = existing_dumps(dirs, JavaDumpAction::Thread);
    process::send_signal(pid, ProcessSignal::Quit)?;
    info!("Requested thread dump from process {}", pid);

    for attempt in 0..poll.max_attempts {
        let now = existing_dumps(dirs, JavaDumpAction::Thread);
        if let Some(created) = now.difference(&before).max_by_key(|p| modified(p)) {
            return Ok(Some(created.clone()));
        }
        debug!("No new thread dump yet (attempt {})", attempt + 1);
        std::thread::sleep(poll.interval);
    }
    warn!("Process {} did not write a thread dump file", pid);
    Ok(None)
}

/// Delete the oldest `action` dumps in `dir` beyond `keep`. Returns the count removed.
pub fn prune_dumps(dir: &Path, action: JavaDumpAction, keep: usize) -> io::Result<usize> {
    let mut dumps: Vec<(SystemTime, PathBuf)> = existing_dumps(&[dir.to_path_buf()], action)
        .into_iter()
        .map(|p| (modified(&p), p))
        .collect();
    if dumps.len() <= keep {
        return Ok(0);
    }
    // newest first, ties broken by name so the sequence number decides
    dumps.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut removed = 0;
    for (_, path) in dumps.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Pruned {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Cannot prune {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
