// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server lock file.
//!
//! A running server holds an exclusive lock on `workarea/.sLock` for its
//! whole life. Other processes learn whether it runs by trying the lock.
//! The file's existence is always checked before the lock is tried: on some
//! platforms the file can vanish under a live server, and a lock attempt on a
//! freshly recreated file would then report the server as stopped.

use crate::config::PollSettings;
use crate::layout::ServerLayout;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("server lock {0} is held by another process")]
    AlreadyHeld(PathBuf),
}

/// Who holds the lock right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLockState {
    HeldByThisProcess,
    /// Another process, i.e. the server is running.
    HeldByOtherProcess,
    NotHeld,
}

/// Lock file probe for one server.
#[derive(Debug, Clone)]
pub struct ServerLock {
    server_name: String,
    lock_file: PathBuf,
    pid_file: PathBuf,
    poll: PollSettings,
    held_here: Arc<AtomicBool>,
}

impl ServerLock {
    pub fn new(layout: &ServerLayout, poll: PollSettings) -> Self {
        Self {
            server_name: layout.server_name().to_string(),
            lock_file: layout.lock_file(),
            pid_file: layout.pid_file(),
            poll,
            held_here: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn lock_file(&self) -> &Path {
        &self.lock_file
    }

    pub fn lock_file_exists(&self) -> bool {
        self.lock_file.is_file()
    }

    /// Whether some process holds the lock. False when the file is absent.
    pub fn test_server_running(&self) -> bool {
        self.state() != ServerLockState::NotHeld
    }

    pub fn state(&self) -> ServerLockState {
        if !self.lock_file_exists() {
            return ServerLockState::NotHeld;
        }
        if self.held_here.load(Ordering::SeqCst) {
            return ServerLockState::HeldByThisProcess;
        }

        let file = match OpenOptions::new().read(true).write(true).open(&self.lock_file) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ServerLockState::NotHeld,
            Err(e) => {
                // cannot tell; treat as running so callers go through the protocol
                warn!("Cannot open {}: {}", self.lock_file.display(), e);
                return ServerLockState::HeldByOtherProcess;
            }
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                ServerLockState::NotHeld
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                ServerLockState::HeldByOtherProcess
            }
            Err(e) => {
                warn!("Cannot test {}: {}", self.lock_file.display(), e);
                ServerLockState::HeldByOtherProcess
            }
        }
    }

    /// Take the lock for this process and record its pid.
    pub fn acquire(&self) -> Result<ServerLockGuard, LockError> {
        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_file)
            .map_err(|e| self.io_error(&self.lock_file, e))?;
        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                LockError::AlreadyHeld(self.lock_file.clone())
            } else {
                self.io_error(&self.lock_file, e)
            }
        })?;
        self.held_here.store(true, Ordering::SeqCst);

        if let Err(e) = write_pid(&self.pid_file) {
            warn!("Cannot write {}: {}", self.pid_file.display(), e);
        }
        info!("Acquired server lock for {}", self.server_name);
        Ok(ServerLockGuard {
            file: Some(file),
            pid_file: self.pid_file.clone(),
            held_here: self.held_here.clone(),
        })
    }

    /// Poll until the lock is released; false when attempts run out.
    pub fn wait_for_stop(&self) -> bool {
        for attempt in 0..self.poll.max_attempts {
            if !self.test_server_running() {
                return true;
            }
            debug!(
                "Waiting for server {} to stop (attempt {})",
                self.server_name,
                attempt + 1
            );
            std::thread::sleep(self.poll.interval);
        }
        !self.test_server_running()
    }

    fn io_error(&self, path: &Path, source: io::Error) -> LockError {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn write_pid(pid_file: &Path) -> io::Result<()> {
    if let Some(parent) = pid_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(pid_file)?;
    writeln!(file, "{}", std::process::id())
}

/// Held server lock; released on drop.
#[derive(Debug)]
pub struct ServerLockGuard {
    file: Option<File>,
    pid_file: PathBuf,
    held_here: Arc<AtomicBool>,
}

impl ServerLockGuard {
    /// Release now instead of at drop.
    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                warn!("Failed to release server lock: {}", e);
            }
            let _ = fs::remove_file(&self.pid_file);
            self.held_here.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for ServerLockGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn poll() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(10),
            max_attempts: 20,
            process_exit_attempts: 20,
        }
    }

    #[test]
    fn test_absent_lock_file_is_not_running() {
        let dir = tempdir().unwrap();
        let layout = ServerLayout::new(dir.path(), "s1");
        let lock = ServerLock::new(&layout, poll());
        assert!(!lock.lock_file_exists());
        assert_eq!(lock.state(), ServerLockState::NotHeld);
        assert!(lock.wait_for_stop());
    }

    #[test]
    fn test_stale_lock_file_is_not_running() {
        let dir = tempdir().unwrap();
        let layout = ServerLayout::new(dir.path(), "s1");
        fs::create_dir_all(layout.workarea_dir()).unwrap();
        fs::write(layout.lock_file(), "").unwrap();

        let lock = ServerLock::new(&layout, poll());
        assert!(lock.lock_file_exists());
        assert!(!lock.test_server_running());
    }

    #[test]
    fn test_held_lock_states() {
        let dir = tempdir().unwrap();
        let layout = ServerLayout::new(dir.path(), "s1");
        let owner = ServerLock::new(&layout, poll());
        let guard = owner.acquire().unwrap();

        assert_eq!(owner.state(), ServerLockState::HeldByThisProcess);
        assert_eq!(layout.read_pid(), Some(std::process::id()));

        // a separate probe opens its own handle, like another process would
        let probe = ServerLock::new(&layout, poll());
        assert_eq!(probe.state(), ServerLockState::HeldByOtherProcess);
        assert!(matches!(probe.acquire(), Err(LockError::AlreadyHeld(_))));
        assert!(!probe.wait_for_stop());

        guard.release();
        assert_eq!(probe.state(), ServerLockState::NotHeld);
        assert_eq!(owner.state(), ServerLockState::NotHeld);
        assert_eq!(layout.read_pid(), None);
    }

    #[test]
    fn test_wait_for_stop_sees_release() {
        let dir = tempdir().unwrap();
        let layout = ServerLayout::new(dir.path(), "s1");
        let guard = ServerLock::new(&layout, poll()).acquire().unwrap();

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(guard);
        });
        assert!(ServerLock::new(&layout, poll()).wait_for_stop());
        releaser.join().unwrap();
    }
}
