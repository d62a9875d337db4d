// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! srvctl - start, stop, dump and package servers.
//!
//! # Usage
//!
//! ```bash
//! srvctl start myServer
//! srvctl stop myServer --force
//! srvctl dump myServer --include=thread,heap --archive=/tmp/myServer.zip
//! srvctl package myServer --include=minify --os=linux
//! ```
//!
//! The process exit code is the numeric return code of the operation.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use srvctl_core::lifecycle::INSTALL_DIR_ENV;
use srvctl_core::{
    DumpOptions, DumpPackager, JavaDumpAction, LauncherConfig, PackageOptions,
    PackageOrchestrator, ReturnCode, ServerControl, ServerLayout,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER: &str = "defaultServer";

/// Server lifecycle control
#[derive(Parser, Debug)]
#[command(name = "srvctl")]
#[command(about = "Start, stop, dump and package servers")]
#[command(version)]
struct Args {
    /// Runtime install directory (defaults to the parent of this binary's directory)
    #[arg(long, env = INSTALL_DIR_ENV, global = true)]
    install_dir: Option<PathBuf>,

    /// Launcher configuration file (defaults to <install>/etc/srvctl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v/-q
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Launch the server and wait until it is started
    Start {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Stop a running server
    Stop {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        /// Stop without quiescing
        #[arg(long)]
        force: bool,
    },
    /// Report whether the server is running
    Status {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Pause inbound work
    Pause {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        /// Comma-separated component names
        #[arg(long)]
        target: Option<String>,
    },
    /// Resume paused work
    Resume {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        /// Comma-separated component names
        #[arg(long)]
        target: Option<String>,
    },
    /// Archive configuration, logs and diagnostics
    Dump {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Java dumps to take: heap, thread, system
        #[arg(long)]
        include: Option<String>,
    },
    /// Take java dumps of a running server
    Javadump {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        /// Java dumps to take (default: thread)
        #[arg(long)]
        include: Option<String>,
    },
    /// Package the runtime and/or the server into an archive
    Package {
        #[arg(default_value = DEFAULT_SERVER)]
        server: String,
        #[arg(long)]
        archive: Option<PathBuf>,
        /// all, usr, wlp, minify, runnable (comma-separated)
        #[arg(long)]
        include: Option<String>,
        /// Root directory inside the archive
        #[arg(long)]
        server_root: Option<String>,
        /// Target platforms for minify
        #[arg(long)]
        os: Option<String>,
    },
}

impl Action {
    fn server(&self) -> &str {
        match self {
            Self::Start { server }
            | Self::Stop { server, .. }
            | Self::Status { server }
            | Self::Pause { server, .. }
            | Self::Resume { server, .. }
            | Self::Dump { server, .. }
            | Self::Javadump { server, .. }
            | Self::Package { server, .. } => server,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let rc = match run(&args) {
        Ok(rc) => rc,
        Err(e) => {
            eprintln!("srvctl: {:#}", e);
            ReturnCode::BadArgument
        }
    };
    debug!("Exiting with {} ({})", rc, rc.code());
    std::process::exit(rc.code());
}

fn init_logging(args: &Args) {
    let level = if let Some(level) = &args.log_level {
        level.as_str()
    } else if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<ReturnCode> {
    let install_dir = match &args.install_dir {
        Some(dir) => dir.clone(),
        None => default_install_dir()?,
    };
    let server = args.action.server();
    let layout = ServerLayout::from_env(&install_dir, server);

    let config_path = args.config.clone().unwrap_or_else(|| layout.config_file());
    let config = LauncherConfig::load_or_default(&config_path)
        .with_context(|| format!("invalid launcher config {}", config_path.display()))?;
    let control = ServerControl::new(layout, config);

    let rc = match &args.action {
        Action::Start { .. } => {
            println!("Starting server {}.", server);
            let rc = control.start();
            report(server, rc, "started");
            rc
        }
        Action::Stop { force, .. } => {
            println!("Stopping server {}.", server);
            let rc = control.stop(*force);
            report(server, rc, "stopped");
            rc
        }
        Action::Status { .. } => {
            let rc = control.status();
            report(server, rc, "running");
            rc
        }
        Action::Pause { target, .. } => {
            let rc = control.pause(target.as_deref());
            report(server, rc, "paused");
            rc
        }
        Action::Resume { target, .. } => {
            let rc = control.resume(target.as_deref());
            report(server, rc, "resumed");
            rc
        }
        Action::Dump {
            archive, include, ..
        } => {
            let java_dumps = match include {
                Some(list) => JavaDumpAction::parse_list(list)?,
                None => Vec::new(),
            };
            println!("Dumping server {}.", server);
            let options = DumpOptions {
                archive: archive.clone(),
                java_dumps,
            };
            let rc = DumpPackager::new(control).dump(&options);
            report(server, rc, "dumped");
            rc
        }
        Action::Javadump { include, .. } => {
            let actions = match include {
                Some(list) => JavaDumpAction::parse_list(list)?,
                None => vec![JavaDumpAction::Thread],
            };
            let (rc, locations) = control.java_dump(&actions);
            for (action, path) in &locations {
                if !path.is_empty() {
                    println!("Server {} {} dump created in {}.", server, action, path);
                }
            }
            if rc != ReturnCode::Ok {
                report(server, rc, "dumped");
            }
            rc
        }
        Action::Package {
            archive,
            include,
            server_root,
            os,
            ..
        } => {
            println!("Packaging server {}.", server);
            let options = PackageOptions {
                archive: archive.clone(),
                include: include.clone(),
                server_root: server_root.clone(),
                os: os.clone(),
            };
            let rc = PackageOrchestrator::new(control).package(&options);
            report(server, rc, "packaged");
            rc
        }
    };
    Ok(rc)
}

/// `<install>/bin/srvctl` -> `<install>`
fn default_install_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate the srvctl binary")?;
    exe.parent()
        .and_then(|bin| bin.parent())
        .map(PathBuf::from)
        .context("cannot derive the install directory; pass --install-dir")
}

fn report(server: &str, rc: ReturnCode, done: &str) {
    let line = match rc {
        ReturnCode::Ok => format!("Server {} {}.", server, done),
        ReturnCode::RedundantActionStatus => format!("Server {} is already {}.", server, done),
        ReturnCode::ServerNotExistStatus => format!("Server {} does not exist.", server),
        ReturnCode::ServerActiveStatus => format!("Server {} is running.", server),
        ReturnCode::ServerInactiveStatus => format!("Server {} is not running.", server),
        ReturnCode::ServerUnknownStatus => {
            format!("Server {} is running but cannot be reached.", server)
        }
        ReturnCode::ServerCommandPortDisabledStatus => {
            format!("Server {} has its command port disabled.", server)
        }
        other => format!("Server {} was not {} ({}).", server, done, other),
    };
    println!("{}", line);
}
