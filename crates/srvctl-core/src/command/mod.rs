// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local command protocol between the CLI and a running server.
//!
//! The server advertises its loopback port and session token in the command
//! descriptor file. One connection carries exactly one command:
//!
//! ```text
//! client                                   server
//!   | -- "stop" ---------------------------> |
//!   | <------------------ challenge token -- |  creates <authDir>/<token>
//!   |  delete <authDir>/<token>              |
//!   | -- challenge token ------------------> |  checks file is gone
//!   | <-------------- "<session>[#<rc>]" --- |
//! ```
//!
//! Arguments are separated by `#`, list items inside an argument by `,`.

pub mod client;
pub mod descriptor;
pub mod listener;
pub mod wire;

pub use client::ServerCommandClient;
pub use descriptor::{CommandDescriptor, CommandPort};
pub use listener::{CommandHandler, CommandListener};

use crate::dump::JavaDumpAction;
use std::fmt;
use thiserror::Error;

/// Argument separator.
pub const DELIM: char = '#';
/// List separator inside one argument.
pub const LIST_DELIM: char = ',';

/// Protocol errors.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command descriptor missing or unreadable")]
    ServerUnreachable,

    #[error("command port disabled")]
    CommandPortDisabled,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("command file mismatch: expected session {expected}, server answered {actual}")]
    CommandFileMismatch { expected: String, actual: String },

    #[error("invalid authorization challenge '{0}'")]
    InvalidChallenge(String),

    #[error("invalid return code '{0}'")]
    InvalidReturnCode(String),

    #[error("connection closed by server without a reply")]
    EmptyResponse,

    #[error("malformed command '{0}'")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commands understood by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    ForceStop,
    /// Poll sent while waiting for a server to finish starting.
    StatusStart,
    /// Write introspection data into `dump_<timestamp>`, optionally with java dumps.
    Introspect {
        timestamp: String,
        java_dumps: Vec<JavaDumpAction>,
    },
    JavaDump(Vec<JavaDumpAction>),
    Pause(Option<String>),
    Resume(Option<String>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::ForceStop => "forceStop",
            Self::StatusStart => "status:start",
            Self::Introspect { java_dumps, .. } if java_dumps.is_empty() => "introspect",
            Self::Introspect { .. } => "introspectJavadump",
            Self::JavaDump(_) => "javadump",
            Self::Pause(_) => "pause",
            Self::Resume(_) => "resume",
        }
    }

    pub fn encode(&self) -> String {
        let mut out = self.name().to_string();
        let mut arg = |value: &str| {
            out.push(DELIM);
            out.push_str(value);
        };
        match self {
            Self::Introspect {
                timestamp,
                java_dumps,
            } => {
                arg(timestamp);
                if !java_dumps.is_empty() {
                    arg(&JavaDumpAction::join(java_dumps));
                }
            }
            Self::JavaDump(actions) => arg(&JavaDumpAction::join(actions)),
            Self::Pause(Some(targets)) | Self::Resume(Some(targets)) => arg(targets),
            _ => {}
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let malformed = || CommandError::Malformed(text.to_string());
        let mut parts = text.splitn(3, DELIM);
        let name = parts.next().unwrap_or_default();
        let first = parts.next().filter(|s| !s.is_empty());
        let second = parts.next().filter(|s| !s.is_empty());

        let actions = |list: Option<&str>| {
            JavaDumpAction::parse_list(list.unwrap_or_default()).map_err(|_| malformed())
        };

        match name {
            "stop" => Ok(Self::Stop),
            "forceStop" => Ok(Self::ForceStop),
            "status:start" => Ok(Self::StatusStart),
            "introspect" | "introspectJavadump" => Ok(Self::Introspect {
                timestamp: first.ok_or_else(malformed)?.to_string(),
                java_dumps: actions(second)?,
            }),
            "javadump" => Ok(Self::JavaDump(actions(first)?)),
            "pause" => Ok(Self::Pause(first.map(str::to_string))),
            "resume" => Ok(Self::Resume(first.map(str::to_string))),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Split a `,` list argument.
pub fn split_list(arg: &str) -> Vec<String> {
    arg.split(LIST_DELIM)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
