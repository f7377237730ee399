//! Lifecycle controller for a single lab process.
//!
//! A [`Lab`] owns the launched process, the side-channel file the tool writes
//! the container identifier to, and every auxiliary resource that must be
//! released when the lab goes away. It moves through [`LabState`]:
//!
//! ```text
//! Created -> Starting -> Running
//!                     \-> Failed
//! (any) -> Closed
//! ```
//!
//! Every operation takes `&self`, so a lab can be shared between the test
//! body and helper threads. Closing is total: it kills the process, releases
//! resources and removes the side-channel file whatever stage was reached,
//! logging failures instead of returning them.

mod start;
mod watch;

use std::ffi::OsString;
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use labtest_config::AddressingMode;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::LabError;
use crate::launch::{LaunchSpec, Launcher};
use crate::lines::LogFn;
use crate::netconfig::NetConfig;
use crate::release::Release;
use crate::signal::{CompletionSignal, ExitDescription};
use crate::tool::Inspector;

/// Tracing target for lab lifecycle events.
pub(crate) const LAB_TARGET: &str = "labtest::lab";

/// Grace period after the lab's output closes during which an exit counts
/// as a failure to start.
pub const READINESS_WINDOW: Duration = Duration::from_millis(50);

/// Interval between exit checks of the monitor thread.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Prefix of the side-channel file names.
const ID_FILE_PREFIX: &str = "labtest.";

/// Stage a lab has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabState {
    /// Created but not started.
    Created,
    /// `start` is in progress.
    Starting,
    /// Detached and identified.
    Running,
    /// `start` returned an error.
    Failed,
    /// Closed; nothing further can happen.
    Closed,
}

/// A lab process and everything attached to it.
pub struct Lab {
    id_file: PathBuf,
    program: OsString,
    launch: Mutex<Option<LaunchSpec>>,
    inspector: Arc<dyn Inspector>,
    mode: AddressingMode,
    state: Mutex<LabState>,
    child: Arc<Mutex<Option<Child>>>,
    signal: Arc<CompletionSignal>,
    identifier: OnceCell<String>,
    resources: Mutex<Vec<Box<dyn Release>>>,
    net_config: Mutex<Option<Arc<NetConfig>>>,
    logger: Mutex<Option<LogFn>>,
}

impl std::fmt::Debug for Lab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab")
            .field("program", &self.program)
            .field("id_file", &self.id_file)
            .field("state", &self.state())
            .field("identifier", &self.identifier())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Lab {
    /// Creates a lab without starting it.
    ///
    /// A uniquely named side-channel file is allocated and handed to
    /// `launcher`, which describes the process to run.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::IdFile`] when the side-channel file cannot be
    /// created.
    pub fn new(
        launcher: impl Launcher,
        inspector: Arc<dyn Inspector>,
        mode: AddressingMode,
    ) -> Result<Self, LabError> {
        let id_file = tempfile::Builder::new()
            .prefix(ID_FILE_PREFIX)
            .tempfile()
            .map_err(|source| LabError::IdFile {
                source: Arc::new(source),
            })?
            .into_temp_path()
            .keep()
            .map_err(|persist| LabError::IdFile {
                source: Arc::new(persist.error),
            })?;
        let spec = launcher.into_spec(&id_file);
        let program = spec.program().to_os_string();
        debug!(
            target: LAB_TARGET,
            program = ?program,
            file = %id_file.display(),
            "lab created"
        );
        Ok(Self {
            id_file,
            program,
            launch: Mutex::new(Some(spec)),
            inspector,
            mode,
            state: Mutex::new(LabState::Created),
            child: Arc::new(Mutex::new(None)),
            signal: Arc::new(CompletionSignal::new()),
            identifier: OnceCell::new(),
            resources: Mutex::new(Vec::new()),
            net_config: Mutex::new(None),
            logger: Mutex::new(None),
        })
    }

    /// Routes the lab's internal event log to `logger`.
    pub fn set_logger(&self, logger: LogFn) {
        *lock(&self.logger) = Some(logger);
    }

    /// Logs an internal lab event.
    ///
    /// The message always goes to `tracing`; it is also passed to the
    /// callback installed with [`Lab::set_logger`].
    pub fn log(&self, message: &str) {
        debug!(target: LAB_TARGET, file = %self.id_file.display(), "{message}");
        let callback = lock(&self.logger).clone();
        if let Some(log_line) = callback {
            log_line(message);
        }
    }

    /// Launches the process and waits until it has detached.
    ///
    /// The output of the process is copied until the process closes it, with
    /// no timeout: a process that keeps its output open without exiting keeps
    /// this call blocked. Once the output closes, an exit within
    /// [`READINESS_WINDOW`] is reported as a failure to start. The lab then
    /// reads its identifier from the side-channel file.
    ///
    /// Whatever the outcome, the lab must still be closed.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::AlreadyStarted`] or [`LabError::Closed`] when the
    /// lab is not in the created state, a launch error when the process
    /// cannot be spawned, [`LabError::PrematureExit`] when it exited, and an
    /// identifier error when the side-channel file is unreadable or empty.
    pub fn start(&self) -> Result<(), LabError> {
        let parts = {
            let mut state = lock(&self.state);
            match *state {
                LabState::Created => {}
                LabState::Closed => return Err(LabError::Closed),
                LabState::Starting | LabState::Running | LabState::Failed => {
                    return Err(LabError::AlreadyStarted);
                }
            }
            let spec = lock(&self.launch).take().ok_or(LabError::AlreadyStarted)?;
            *state = LabState::Starting;
            spec.into_parts()
        };
        self.log("starting lab");
        info!(
            target: LAB_TARGET,
            program = ?self.program,
            file = %self.id_file.display(),
            "starting lab"
        );

        let result = start::run(self, parts);
        self.settle(&result);
        let resolved = result?;
        let identifier = self.identifier.get_or_init(|| resolved);
        info!(target: LAB_TARGET, identifier = %identifier, "lab running");
        self.log(&format!("lab running: {identifier}"));
        Ok(())
    }

    fn settle(&self, result: &Result<String, LabError>) {
        {
            let mut state = lock(&self.state);
            if *state != LabState::Closed {
                *state = if result.is_ok() {
                    LabState::Running
                } else {
                    LabState::Failed
                };
            }
        }
        if let Err(error) = result {
            warn!(
                target: LAB_TARGET,
                program = ?self.program,
                error = %error,
                "lab failed to start"
            );
            self.log(&format!("lab failed to start: {error}"));
        }
    }

    /// Kills the process if necessary and releases everything the lab holds.
    ///
    /// Safe to call in every state and more than once; only the first call
    /// does anything. Failures are logged, never returned, and the remaining
    /// steps still run. The side-channel file is always removed.
    pub fn close(&self) {
        let previous = {
            let mut state = lock(&self.state);
            if *state == LabState::Closed {
                return;
            }
            std::mem::replace(&mut *state, LabState::Closed)
        };
        self.log("closing lab");
        if previous == LabState::Created {
            drop(lock(&self.launch).take());
            self.signal.fire(ExitDescription::Abandoned);
        }
        self.terminate();

        let resources = std::mem::take(&mut *lock(&self.resources));
        for resource in resources {
            release_logged(resource.as_ref());
        }

        match fs::remove_file(&self.id_file) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: LAB_TARGET,
                    file = %self.id_file.display(),
                    error = %error,
                    "failed to remove lab id file"
                );
            }
            _ => {}
        }
        info!(target: LAB_TARGET, file = %self.id_file.display(), "lab closed");
    }

    /// Kills the process unless it has already ended, then reaps it.
    fn terminate(&self) {
        let mut slot = lock(&self.child);
        let Some(child) = slot.as_mut() else {
            return;
        };
        if self.signal.is_fired() {
            return;
        }
        self.log("killing lab process");
        if let Err(error) = child.kill() {
            warn!(
                target: LAB_TARGET,
                pid = child.id(),
                error = %error,
                "failed to kill lab process"
            );
            return;
        }
        match child.wait() {
            Ok(status) => {
                self.signal.fire(ExitDescription::Exited(status));
            }
            Err(error) => {
                warn!(
                    target: LAB_TARGET,
                    pid = child.id(),
                    error = %error,
                    "failed to reap lab process"
                );
            }
        }
    }

    /// Blocks until the process has ended, returning how it ended.
    ///
    /// Returns at once when the launch failed or the lab was closed before
    /// it started. Any number of threads may wait at the same time.
    pub fn wait(&self) -> ExitDescription {
        self.signal.wait()
    }

    /// Blocks until the process has ended or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitDescription> {
        self.signal.wait_timeout(timeout)
    }

    /// Returns `true` once the process has ended. Never blocks.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.signal.is_fired()
    }

    /// How the process ended, once it has.
    #[must_use]
    pub fn exit_description(&self) -> Option<ExitDescription> {
        self.signal.outcome()
    }

    /// Container identifier, available once the lab is running.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.get().map(String::as_str)
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn state(&self) -> LabState {
        *lock(&self.state)
    }

    /// Side-channel file the identifier is read from.
    #[must_use]
    pub fn id_file(&self) -> &Path {
        &self.id_file
    }

    /// Addressing mode used to resolve access points.
    #[must_use]
    pub const fn addressing_mode(&self) -> AddressingMode {
        self.mode
    }

    /// Hands `resource` to the lab, to be released when it closes.
    ///
    /// A resource registered after the lab closed is released at once.
    pub fn register(&self, resource: Box<dyn Release>) {
        let mut resources = lock(&self.resources);
        if self.state() == LabState::Closed {
            drop(resources);
            release_logged(resource.as_ref());
            return;
        }
        resources.push(resource);
    }

    /// Network configuration of the running lab.
    ///
    /// The first successful call inspects the lab and caches the result;
    /// later calls return the cached value. Concurrent first calls may each
    /// inspect the lab.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotRunning`] before the lab has an identifier,
    /// and inspection or parse errors otherwise.
    pub fn net_config(&self) -> Result<Arc<NetConfig>, LabError> {
        if let Some(cached) = lock(&self.net_config).as_ref() {
            return Ok(Arc::clone(cached));
        }
        self.refresh_net_config()
    }

    /// Inspects the lab again and replaces the cached configuration.
    ///
    /// # Errors
    ///
    /// As for [`Lab::net_config`].
    pub fn refresh_net_config(&self) -> Result<Arc<NetConfig>, LabError> {
        let identifier = self.identifier().ok_or(LabError::NotRunning)?;
        let output = self.inspector.inspect(identifier)?;
        let config = Arc::new(NetConfig::parse(&output)?);
        debug!(
            target: LAB_TARGET,
            identifier,
            interfaces = config.interfaces().len(),
            ports = config.exposed_ports().len(),
            "network configuration resolved"
        );
        *lock(&self.net_config) = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Address and port reaching `port` inside the lab.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Lab::net_config`] and
    /// [`LabError::RouteNotFound`] when no route exists.
    pub fn access_point(&self, port: u16) -> Result<SocketAddr, LabError> {
        self.net_config()?.access_point(port, self.mode)
    }

    /// The lab's primary interface address, if it reported any.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Lab::net_config`].
    pub fn primary_address(&self) -> Result<Option<IpAddr>, LabError> {
        Ok(self.net_config()?.primary_address())
    }
}

impl Drop for Lab {
    fn drop(&mut self) {
        self.close();
    }
}

fn release_logged(resource: &dyn Release) {
    if let Err(error) = resource.release() {
        warn!(
            target: LAB_TARGET,
            resource = resource.name(),
            error = %error,
            "failed to release lab resource"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
