// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-table probing and signals, used when the command port is unavailable.

use crate::config::PollSettings;
use std::io;
use tracing::debug;

/// Signals sent to a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Orderly shutdown.
    Terminate,
    /// Immediate kill.
    Kill,
    /// Thread dump request.
    Quit,
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM: exists but owned by someone else
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
pub fn send_signal(pid: u32, signal: ProcessSignal) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))?;
    let signo = match signal {
        ProcessSignal::Terminate => libc::SIGTERM,
        ProcessSignal::Kill => libc::SIGKILL,
        ProcessSignal::Quit => libc::SIGQUIT,
    };
    debug!("Sending {:?} to process {}", signal, pid);
    // SAFETY: plain kill(2) on a validated positive pid.
    if unsafe { libc::kill(pid, signo) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, _signal: ProcessSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process signals are not supported on this platform",
    ))
}

/// Poll until `pid` leaves the process table; false on timeout.
pub fn wait_for_exit(pid: u32, poll: &PollSettings) -> bool {
    for attempt in 0..poll.process_exit_attempts {
        if !is_alive(pid) {
            return true;
        }
        debug!("Process {} still alive (attempt {})", pid, attempt + 1);
        std::thread::sleep(poll.interval);
    }
    !is_alive(pid)
}
