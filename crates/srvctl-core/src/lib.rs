// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server lifecycle control and packaging.
//!
//! # Features
//!
//! - **Lifecycle**: start, stop, status, pause and resume a named server
//! - **Command protocol**: framed localhost requests authenticated by a
//!   session token and a delete-this-file challenge
//! - **Server lock**: advisory file lock telling running from stopped
//! - **Packaging**: zip, jar, tar, tar.gz and pax archives driven by ordered
//!   include/exclude rules
//! - **Dump**: snapshot configuration, logs and java dumps of a server
//!
//! # Example
//!
//! ```rust,ignore
//! use srvctl_core::{LauncherConfig, ServerControl, ServerLayout};
//!
//! let layout = ServerLayout::from_env("/opt/wlp", "defaultServer");
//! let control = ServerControl::new(layout, LauncherConfig::default());
//! let rc = control.stop(false);
//! std::process::exit(rc.code());
//! ```

pub mod archive;
pub mod command;
pub mod config;
pub mod dump;
pub mod layout;
pub mod lifecycle;
pub mod lock;
pub mod package;
pub mod pattern;
pub mod process;
pub mod return_code;

pub use archive::{ArchiveBuilder, ArchiveError, ArchiveFormat, DirectoryEntry, EntryConfig, FileEntry};
pub use command::{Command, CommandError, CommandHandler, CommandListener, ServerCommandClient};
pub use config::{ConfigError, LauncherConfig, PollSettings};
pub use dump::{DumpOptions, DumpPackager, JavaDumpAction};
pub use layout::ServerLayout;
pub use lifecycle::ServerControl;
pub use lock::{ServerLock, ServerLockState};
pub use package::{IncludeOption, PackageError, PackageOptions, PackageOrchestrator};
pub use pattern::{DefaultPolicy, PatternFilter};
pub use return_code::ReturnCode;
