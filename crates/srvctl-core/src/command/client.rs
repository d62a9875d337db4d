// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client half of the command protocol.

use super::descriptor::{CommandDescriptor, CommandPort};
use super::wire::{read_message, write_message};
use super::{Command, CommandError, DELIM};
use crate::config::LauncherConfig;
use crate::dump::JavaDumpAction;
use crate::layout::ServerLayout;
use crate::return_code::ReturnCode;
use std::fs;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends single commands to the server described by a command file.
#[derive(Debug, Clone)]
pub struct ServerCommandClient {
    server_name: String,
    command_file: PathBuf,
    auth_dir: PathBuf,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ServerCommandClient {
    pub fn new(layout: &ServerLayout, config: &LauncherConfig) -> Self {
        Self {
            server_name: layout.server_name().to_string(),
            command_file: layout.command_file(),
            auth_dir: layout.command_auth_dir(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Whether the descriptor exists and names a port (active or disabled).
    pub fn is_valid(&self) -> bool {
        CommandDescriptor::read(&self.command_file).is_ok()
    }

    pub fn descriptor(&self) -> Result<CommandDescriptor, CommandError> {
        CommandDescriptor::read(&self.command_file)
    }

    /// Run one command and return the server's code.
    ///
    /// A reply without a code means OK. `INVALID`, unknown and internal
    /// codes are protocol errors.
    pub fn send(&self, command: &Command) -> Result<ReturnCode, CommandError> {
        let descriptor = self.descriptor()?;
        let port = match descriptor.port {
            CommandPort::Active(port) => port,
            CommandPort::Disabled => return Err(CommandError::CommandPortDisabled),
        };

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        debug!("Sending '{}' to {} on {}", command, self.server_name, addr);
        let mut stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            if e.kind() == ErrorKind::ConnectionRefused {
                CommandError::ConnectionRefused
            } else {
                CommandError::Io(e)
            }
        })?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;

        write_message(&mut stream, &command.encode())?;

        let challenge = read_message(&mut stream)?;
        if challenge.is_empty() || challenge.contains(['/', '\\']) || challenge.contains("..") {
            return Err(CommandError::InvalidChallenge(challenge));
        }
        match fs::remove_file(self.auth_dir.join(&challenge)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Challenge file {} already gone", challenge);
            }
            Err(e) => return Err(CommandError::Io(e)),
        }
        write_message(&mut stream, &challenge)?;

        let response = match read_message(&mut stream) {
            Ok(response) => response,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(CommandError::EmptyResponse)
            }
            Err(e) => return Err(CommandError::Io(e)),
        };
        if response.is_empty() {
            return Err(CommandError::EmptyResponse);
        }

        let (session, code) = match response.split_once(DELIM) {
            Some((session, code)) => (session, Some(code)),
            None => (response.as_str(), None),
        };
        if session != descriptor.session_token {
            return Err(CommandError::CommandFileMismatch {
                expected: descriptor.session_token,
                actual: session.to_string(),
            });
        }

        match code {
            None => Ok(ReturnCode::Ok),
            Some(code) => match ReturnCode::parse(code) {
                rc if rc.is_internal() => Err(CommandError::InvalidReturnCode(code.to_string())),
                rc => Ok(rc),
            },
        }
    }

    /// Run `command`, folding transport failures into return codes.
    ///
    /// Refused connection or missing descriptor gives `not_started`, a
    /// disabled port gives `SERVER_COMMAND_PORT_DISABLED_STATUS`, anything
    /// else gives `error`.
    pub fn write(&self, command: &Command, not_started: ReturnCode, error: ReturnCode) -> ReturnCode {
        match self.send(command) {
            Ok(rc) => rc,
            Err(CommandError::ServerUnreachable) => not_started,
            Err(CommandError::ConnectionRefused) => {
                debug!("Server {} refused '{}'", self.server_name, command);
                not_started
            }
            Err(CommandError::CommandPortDisabled) => ReturnCode::ServerCommandPortDisabledStatus,
            Err(e) => {
                warn!(
                    "Command '{}' to server {} failed: {}",
                    command, self.server_name, e
                );
                error
            }
        }
    }

    pub fn stop_server(&self, force: bool) -> ReturnCode {
        let command = if force {
            Command::ForceStop
        } else {
            Command::Stop
        };
        self.write(
            &command,
            ReturnCode::RedundantActionStatus,
            ReturnCode::ErrorServerStop,
        )
    }

    /// One `status:start` probe; `START_STATUS_ACTION` means keep polling.
    pub fn start_status_probe(&self, last_attempt: bool) -> ReturnCode {
        let not_started = if last_attempt {
            ReturnCode::ErrorServerStart
        } else {
            ReturnCode::StartStatusAction
        };
        self.write(&Command::StatusStart, not_started, ReturnCode::ErrorServerStart)
    }

    pub fn introspect_server(&self, timestamp: &str, java_dumps: &[JavaDumpAction]) -> ReturnCode {
        self.write(
            &Command::Introspect {
                timestamp: timestamp.to_string(),
                java_dumps: java_dumps.to_vec(),
            },
            ReturnCode::ServerInactiveStatus,
            ReturnCode::ServerUnknownStatus,
        )
    }

    pub fn java_dump(&self, actions: &[JavaDumpAction]) -> ReturnCode {
        self.write(
            &Command::JavaDump(actions.to_vec()),
            ReturnCode::ServerInactiveStatus,
            ReturnCode::ErrorServerDump,
        )
    }

    pub fn pause(&self, targets: Option<&str>) -> ReturnCode {
        self.write(
            &Command::Pause(targets.map(str::to_string)),
            ReturnCode::ServerInactiveStatus,
            ReturnCode::ErrorServerPause,
        )
    }

    pub fn resume(&self, targets: Option<&str>) -> ReturnCode {
        self.write(
            &Command::Resume(targets.map(str::to_string)),
            ReturnCode::ServerInactiveStatus,
            ReturnCode::ErrorServerResume,
        )
    }
}
