// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command descriptor file.
//!
//! ```text
//! 6f1c0b7e-3d0a-4c55-9a43-2b8e4f7d9a10   session token
//! 41235                                  port, or -1 when disabled
//! ```

use super::CommandError;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Advertised listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPort {
    Active(u16),
    Disabled,
}

impl fmt::Display for CommandPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(port) => write!(f, "{}", port),
            Self::Disabled => f.write_str("-1"),
        }
    }
}

/// Parsed descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub session_token: String,
    pub port: CommandPort,
}

impl CommandDescriptor {
    pub fn new(session_token: impl Into<String>, port: CommandPort) -> Self {
        Self {
            session_token: session_token.into(),
            port,
        }
    }

    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut lines = text.lines().map(str::trim);
        let token = lines.next().unwrap_or_default();
        if token.is_empty() {
            return Err(CommandError::ServerUnreachable);
        }
        let port = match lines.next() {
            Some("-1") => CommandPort::Disabled,
            Some(value) => match value.parse::<u16>() {
                Ok(port) if port > 0 => CommandPort::Active(port),
                _ => {
                    debug!("Invalid port '{}' in command descriptor", value);
                    return Err(CommandError::ServerUnreachable);
                }
            },
            // written before the listener bound its port
            None => return Err(CommandError::ServerUnreachable),
        };
        Ok(Self::new(token, port))
    }

    pub fn read(path: &Path) -> Result<Self, CommandError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                debug!("Cannot read command descriptor {}: {}", path.display(), e);
                Err(CommandError::ServerUnreachable)
            }
        }
    }

    pub fn to_text(&self) -> String {
        format!("{}\n{}\n", self.session_token, self.port)
    }

    /// Write through a temporary file so readers never see a partial descriptor.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.to_text())?;
        fs::rename(&tmp, path)
    }
}
