//! Domain errors raised while starting and querying labs.
//!
//! Every failure is a variant of [`LabError`] carrying the context a test
//! needs to report it: the program, the side-channel file, the lab
//! identifier or the port. I/O and JSON sources are held in `Arc`.
//!
//! Closing a lab never produces one of these: teardown failures are logged
//! and the remaining steps still run.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::signal::ExitDescription;

/// Errors arising from lab operations.
#[derive(Debug, Error)]
pub enum LabError {
    /// The side-channel file for the lab identifier could not be allocated.
    #[error("failed to allocate lab id file: {source}")]
    IdFile {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The launch executable does not exist.
    #[error("lab executable {program:?} not found")]
    ExecutableNotFound {
        /// Program that was looked up.
        program: OsString,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The launch executable could not be spawned.
    #[error("failed to spawn lab executable {program:?}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: OsString,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A helper thread for the lab could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        /// Thread name.
        name: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A standard stream of the child could not be attached.
    #[error("failed to attach lab {stream} pipe")]
    PipeAttach {
        /// Stream that had no pipe.
        stream: &'static str,
    },

    /// Copying the lab's output to the configured sink failed.
    #[error("failed to copy lab output: {source}")]
    OutputCopy {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The lab exited before it was confirmed ready.
    #[error("lab exited during startup: {description}")]
    PrematureExit {
        /// How the process ended.
        description: ExitDescription,
    },

    /// The side-channel file could not be read after startup.
    #[error("failed to read lab id file '{path}': {source}")]
    IdentifierRead {
        /// Side-channel file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The side-channel file held no identifier after startup.
    #[error("lab id file '{path}' is empty")]
    EmptyIdentifier {
        /// Side-channel file path.
        path: PathBuf,
    },

    /// `start` was called more than once.
    #[error("lab has already been started")]
    AlreadyStarted,

    /// The lab was used after it was closed.
    #[error("lab has been closed")]
    Closed,

    /// The lab has no identifier because it is not running.
    #[error("lab is not running")]
    NotRunning,

    /// Running the inspection command failed.
    #[error("failed to inspect lab '{identifier}': {source}")]
    Inspect {
        /// Lab identifier.
        identifier: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The inspection command exited unsuccessfully.
    #[error("inspecting lab '{identifier}' failed with status {status:?}: {output}")]
    InspectFailed {
        /// Lab identifier.
        identifier: String,
        /// Exit code, if the command exited normally.
        status: Option<i32>,
        /// Combined output of the command.
        output: String,
    },

    /// One of the network configuration documents was not valid JSON.
    #[error("malformed {document} in lab network configuration: {source}")]
    MalformedNetConfig {
        /// Which document failed to parse.
        document: &'static str,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// An interface address was not an IP literal.
    #[error("error parsing address ({address}) of {interface}")]
    InvalidAddress {
        /// Interface name.
        interface: String,
        /// Rejected address text.
        address: String,
    },

    /// No address and port combination reaches the requested internal port.
    #[error("could not find port mapping for {port}")]
    RouteNotFound {
        /// Internal port that was requested.
        port: u16,
    },

    /// The lab reported no interface addresses.
    #[error("no IP address for lab '{identifier}'")]
    NoPrimaryAddress {
        /// Lab identifier.
        identifier: String,
    },

    /// A collaborator command exited unsuccessfully.
    #[error("collaborator {program:?} exited with status {status:?}")]
    CollaboratorFailed {
        /// Program that was run.
        program: OsString,
        /// Exit code, if the command exited normally.
        status: Option<i32>,
    },

    /// Running a collaborator command failed.
    #[error("failed to run collaborator {program:?}: {source}")]
    Collaborator {
        /// Program that was run.
        program: OsString,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}
