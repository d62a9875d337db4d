// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Closed set of operation outcomes.
//!
//! Every orchestrator converts its internal failures into one of these codes.
//! The numeric value is the process exit code of the CLI and the value carried
//! on the wire in command responses (`sessionToken#code`).
//!
//! ```text
//! 0        OK
//! 1..=9    status codes (redundant action, server state)
//! 20..=39  operation errors
//! < 0      internal sentinels used by polling loops, never exit codes
//! ```

use std::fmt;

/// Outcome of a lifecycle, dump or package operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Ok,

    // Status codes
    /// The server is already in the requested state.
    RedundantActionStatus,
    ServerNotExistStatus,
    ServerActiveStatus,
    ServerInactiveStatus,
    /// The server holds its lock but cannot be reached over the command port.
    ServerUnknownStatus,
    /// The command port was explicitly disabled by configuration.
    ServerCommandPortDisabledStatus,

    // Error codes
    BadArgument,
    ErrorServerStop,
    ErrorServerStart,
    LocationException,
    LaunchException,
    RuntimeException,
    UnknownException,
    ErrorServerPackage,
    ErrorServerDump,
    ErrorServerPause,
    ErrorServerResume,

    // Internal sentinels
    /// Still waiting for the server to finish starting.
    StartStatusAction,
    /// Still waiting for the server to stop.
    StopAction,
    /// Unrecognised or reserved value.
    Invalid,
}

impl ReturnCode {
    const ALL: [ReturnCode; 21] = [
        Self::Ok,
        Self::RedundantActionStatus,
        Self::ServerNotExistStatus,
        Self::ServerActiveStatus,
        Self::ServerInactiveStatus,
        Self::ServerUnknownStatus,
        Self::ServerCommandPortDisabledStatus,
        Self::BadArgument,
        Self::ErrorServerStop,
        Self::ErrorServerStart,
        Self::LocationException,
        Self::LaunchException,
        Self::RuntimeException,
        Self::UnknownException,
        Self::ErrorServerPackage,
        Self::ErrorServerDump,
        Self::ErrorServerPause,
        Self::ErrorServerResume,
        Self::StartStatusAction,
        Self::StopAction,
        Self::Invalid,
    ];

    /// Numeric value used on the wire and as process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::RedundantActionStatus => 1,
            Self::ServerNotExistStatus => 2,
            Self::ServerActiveStatus => 3,
            Self::ServerInactiveStatus => 4,
            Self::ServerUnknownStatus => 5,
            Self::ServerCommandPortDisabledStatus => 6,
            Self::BadArgument => 20,
            Self::ErrorServerStop => 21,
            Self::ErrorServerStart => 22,
            Self::LocationException => 23,
            Self::LaunchException => 24,
            Self::RuntimeException => 25,
            Self::UnknownException => 26,
            Self::ErrorServerPackage => 28,
            Self::ErrorServerDump => 29,
            Self::ErrorServerPause => 30,
            Self::ErrorServerResume => 31,
            Self::StartStatusAction => -2,
            Self::StopAction => -3,
            Self::Invalid => -1,
        }
    }

    /// Map a numeric value back to a code.
    ///
    /// Unrecognised values map to [`ReturnCode::Invalid`], never to `Ok`.
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|rc| rc.code() == code)
            .unwrap_or(Self::Invalid)
    }

    /// Parse the textual form received on the wire.
    pub fn parse(text: &str) -> Self {
        text.trim()
            .parse::<i32>()
            .map(Self::from_code)
            .unwrap_or(Self::Invalid)
    }

    /// Codes that report state rather than failure.
    pub fn is_status(self) -> bool {
        (1..=9).contains(&self.code())
    }

    pub fn is_error(self) -> bool {
        self.code() >= 20 || self == Self::Invalid
    }

    /// Sentinels only appear inside polling loops.
    pub fn is_internal(self) -> bool {
        self.code() < 0
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::RedundantActionStatus => "REDUNDANT_ACTION_STATUS",
            Self::ServerNotExistStatus => "SERVER_NOT_EXIST_STATUS",
            Self::ServerActiveStatus => "SERVER_ACTIVE_STATUS",
            Self::ServerInactiveStatus => "SERVER_INACTIVE_STATUS",
            Self::ServerUnknownStatus => "SERVER_UNKNOWN_STATUS",
            Self::ServerCommandPortDisabledStatus => "SERVER_COMMAND_PORT_DISABLED_STATUS",
            Self::BadArgument => "BAD_ARGUMENT",
            Self::ErrorServerStop => "ERROR_SERVER_STOP",
            Self::ErrorServerStart => "ERROR_SERVER_START",
            Self::LocationException => "LOCATION_EXCEPTION",
            Self::LaunchException => "LAUNCH_EXCEPTION",
            Self::RuntimeException => "RUNTIME_EXCEPTION",
            Self::UnknownException => "UNKNOWN_EXCEPTION",
            Self::ErrorServerPackage => "ERROR_SERVER_PACKAGE",
            Self::ErrorServerDump => "ERROR_SERVER_DUMP",
            Self::ErrorServerPause => "ERROR_SERVER_PAUSE",
            Self::ErrorServerResume => "ERROR_SERVER_RESUME",
            Self::StartStatusAction => "START_STATUS_ACTION",
            Self::StopAction => "STOP_ACTION",
            Self::Invalid => "INVALID",
        };
        write!(f, "{} ({})", name, self.code())
    }
}
