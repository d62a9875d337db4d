// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server half of the command protocol.
//!
//! Binds a loopback port, advertises it in the descriptor file and serves
//! one connection at a time on a background thread. Server behaviour behind
//! each command comes from a [`CommandHandler`]; java dumps go through the
//! injected [`JavaDumper`].

use super::descriptor::{CommandDescriptor, CommandPort};
use super::wire::{read_message, write_message};
use super::{split_list, Command, CommandError, DELIM};
use crate::dump::locations::{write_locations, DumpLocations};
use crate::dump::{DumpError, DumpFileNamer, JavaDumpAction, JavaDumper};
use crate::layout::ServerLayout;
use crate::return_code::ReturnCode;
use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Server behaviour behind each command.
pub trait CommandHandler: Send + Sync {
    fn stop(&self, force: bool) -> ReturnCode;

    /// Answer to `status:start`; called once the listener is up.
    fn status_start(&self) -> ReturnCode {
        ReturnCode::Ok
    }

    /// Write introspection output into `dump_dir`.
    fn introspect(&self, dump_dir: &Path) -> ReturnCode;

    fn pause(&self, targets: &[String]) -> ReturnCode;

    fn resume(&self, targets: &[String]) -> ReturnCode;
}

/// Running (or disabled) command listener. Dropping it removes the descriptor.
pub struct CommandListener {
    descriptor_path: PathBuf,
    session_token: String,
    port: CommandPort,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Options for [`CommandListener::start`].
pub struct CommandListenerBuilder {
    layout: ServerLayout,
    handler: Arc<dyn CommandHandler>,
    dumper: Option<Arc<dyn JavaDumper>>,
    session_token: Option<String>,
}

impl CommandListenerBuilder {
    pub fn dumper(mut self, dumper: Arc<dyn JavaDumper>) -> Self {
        self.dumper = Some(dumper);
        self
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Bind `127.0.0.1:0`, write the descriptor and start serving.
    pub fn start(self) -> io::Result<CommandListener> {
        let auth_dir = self.layout.command_auth_dir();
        fs::create_dir_all(&auth_dir)?;

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
        let addr = listener.local_addr()?;
        let session_token = self
            .session_token
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let descriptor_path = self.layout.command_file();
        CommandDescriptor::new(&session_token, CommandPort::Active(addr.port()))
            .write(&descriptor_path)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher {
            session_token: session_token.clone(),
            auth_dir,
            layout: self.layout,
            handler: self.handler,
            dumper: self.dumper,
            namer: DumpFileNamer::new(),
        };

        let stop = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name("command-listener".into())
            .spawn(move || accept_loop(listener, dispatcher, stop))?;

        info!("Command listener started on {}", addr);
        Ok(CommandListener {
            descriptor_path,
            session_token,
            port: CommandPort::Active(addr.port()),
            shutdown,
            thread: Some(thread),
        })
    }
}

impl CommandListener {
    pub fn builder(layout: ServerLayout, handler: Arc<dyn CommandHandler>) -> CommandListenerBuilder {
        CommandListenerBuilder {
            layout,
            handler,
            dumper: None,
            session_token: None,
        }
    }

    /// Advertise a disabled command port; clients get
    /// `SERVER_COMMAND_PORT_DISABLED_STATUS` without connecting.
    pub fn disabled(layout: &ServerLayout) -> io::Result<Self> {
        let session_token = Uuid::new_v4().to_string();
        let descriptor_path = layout.command_file();
        CommandDescriptor::new(&session_token, CommandPort::Disabled).write(&descriptor_path)?;
        info!("Command port disabled for server {}", layout.server_name());
        Ok(Self {
            descriptor_path,
            session_token,
            port: CommandPort::Disabled,
            shutdown: Arc::new(AtomicBool::new(true)),
            thread: None,
        })
    }

    pub fn port(&self) -> CommandPort {
        self.port
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Stop accepting and delete the descriptor. Idempotent.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if let CommandPort::Active(port) = self.port {
                // wake the blocking accept
                let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, port));
            }
            if thread.join().is_err() {
                error!("Command listener thread panicked");
            }
        }
        match fs::remove_file(&self.descriptor_path) {
            Ok(()) => debug!("Removed {}", self.descriptor_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove {}: {}",
                self.descriptor_path.display(),
                e
            ),
        }
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, dispatcher: Dispatcher, shutdown: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                if let Err(e) = dispatcher.serve(stream) {
                    warn!("Command connection failed: {}", e);
                }
            }
            Err(e) => warn!("Accept error: {}", e),
        }
    }
    debug!("Command listener stopped");
}

struct Dispatcher {
    session_token: String,
    auth_dir: PathBuf,
    layout: ServerLayout,
    handler: Arc<dyn CommandHandler>,
    dumper: Option<Arc<dyn JavaDumper>>,
    namer: DumpFileNamer,
}

impl Dispatcher {
    fn serve(&self, mut stream: TcpStream) -> Result<(), CommandError> {
        stream.set_read_timeout(Some(CONNECTION_TIMEOUT))?;
        stream.set_write_timeout(Some(CONNECTION_TIMEOUT))?;

        let text = read_message(&mut stream)?;
        debug!("Received command '{}'", text);

        let challenge = Uuid::new_v4().to_string();
        let auth_file = self.auth_dir.join(&challenge);
        fs::write(&auth_file, b"")?;
        write_message(&mut stream, &challenge)?;

        let echoed = read_message(&mut stream);
        let deleted = !auth_file.exists();
        if !deleted {
            let _ = fs::remove_file(&auth_file);
        }
        let echoed = echoed?;
        if echoed != challenge || !deleted {
            // no reply: the client reports a communication error
            return Err(CommandError::InvalidChallenge(echoed));
        }

        let rc = match Command::parse(&text) {
            Ok(command) => self.dispatch(&command),
            Err(e) => {
                warn!("Rejecting command: {}", e);
                ReturnCode::BadArgument
            }
        };
        write_message(
            &mut stream,
            &format!("{}{}{}", self.session_token, DELIM, rc.code()),
        )?;
        Ok(())
    }

    fn dispatch(&self, command: &Command) -> ReturnCode {
        match command {
            Command::Stop => self.handler.stop(false),
            Command::ForceStop => self.handler.stop(true),
            Command::StatusStart => self.handler.status_start(),
            Command::Introspect {
                timestamp,
                java_dumps,
            } => {
                let dump_dir = self.layout.dump_dir(timestamp);
                if let Err(e) = fs::create_dir_all(&dump_dir) {
                    warn!("Cannot create {}: {}", dump_dir.display(), e);
                    return ReturnCode::ErrorServerDump;
                }
                let rc = self.handler.introspect(&dump_dir);
                if java_dumps.is_empty() || rc != ReturnCode::Ok {
                    rc
                } else {
                    self.java_dumps(java_dumps)
                }
            }
            Command::JavaDump(actions) => self.java_dumps(actions),
            Command::Pause(targets) => self
                .handler
                .pause(&targets.as_deref().map(split_list).unwrap_or_default()),
            Command::Resume(targets) => self
                .handler
                .resume(&targets.as_deref().map(split_list).unwrap_or_default()),
        }
    }

    /// Take each dump and record where it went.
    fn java_dumps(&self, actions: &[JavaDumpAction]) -> ReturnCode {
        let output_dir = self.layout.output_dir();
        let mut locations = DumpLocations::new();
        for &action in actions {
            let path = match &self.dumper {
                Some(dumper) => match dumper.dump(action, &self.namer.next_path(&output_dir, action)) {
                    Ok(path) => path.to_string_lossy().into_owned(),
                    Err(DumpError::Unsupported(_)) => String::new(),
                    Err(e) => {
                        warn!("{} dump failed: {}", action, e);
                        String::new()
                    }
                },
                None => String::new(),
            };
            if !path.is_empty() {
                info!("{} dump written to {}", action, path);
            }
            locations.insert(action, path);
        }

        match write_locations(&self.layout.dump_locations_file(), &locations) {
            Ok(()) => ReturnCode::Ok,
            Err(e) => {
                warn!("Cannot record dump locations: {}", e);
                ReturnCode::ErrorServerDump
            }
        }
    }
}
