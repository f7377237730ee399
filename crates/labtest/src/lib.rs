//! Lifecycle management for lab processes used as test fixtures.
//!
//! A lab is a containerised service started through an external tool. The
//! tool runs a lab script, detaches once the service is up, writes the
//! container identifier to a file it was given, and keeps the container
//! alive until its stdin closes. This crate wraps that contract:
//!
//! - [`Lab`] launches the process, streams its output, tells a failed start
//!   from a successful detach, reads the identifier and tears everything
//!   down again, idempotently, from whatever stage was reached;
//! - [`NetConfig`] holds the lab's interfaces and port mappings and resolves
//!   where a test should connect under the configured [`AddressingMode`];
//! - [`Fixture`] composes the two for tests, routing output through a
//!   [`LineLogger`] and turning failures into fatal test errors when a
//!   [`TestReporter`] is bound.
//!
//! The external tool is reached through [`LabTool`]; tests substitute
//! launchers and [`Inspector`] implementations instead.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use labtest::{Fixture, FixtureSpec, LabTool, PanicReporter, TestReporter};
//!
//! let reporter: Arc<dyn TestReporter> = Arc::new(PanicReporter);
//! let spec = FixtureSpec::new("pg:", LabTool::new("mlab"), "labs/postgres.mlab")
//!     .with_args(["-port", "0", "-detach"]);
//! let postgres = Fixture::start(spec, Some(reporter))?;
//! let endpoint = postgres.access_point(5432)?;
//! println!("postgres listening on {endpoint}");
//! postgres.close();
//! # Ok::<(), labtest::LabError>(())
//! ```

mod error;
mod fixture;
mod gate;
mod lab;
mod launch;
mod lines;
mod netconfig;
mod release;
mod signal;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod tool;

pub use error::LabError;
pub use fixture::{Fixture, FixtureSpec, PanicReporter, TestReporter};
pub use gate::ReadinessGate;
pub use lab::{Lab, LabState, POLL_INTERVAL, READINESS_WINDOW};
pub use labtest_config::{AddressingMode, LabConfig};
pub use launch::{LabInput, LabOutput, LaunchSpec, Launcher};
pub use lines::{LineLogger, LineWriter, LogFn, default_logger};
pub use netconfig::{NetConfig, PRIMARY_INTERFACE};
pub use release::Release;
pub use signal::{CompletionSignal, ExitDescription};
pub use tool::{INSPECT_TEMPLATE, Inspector, LabScript, LabTool};

#[cfg(test)]
mod tests;
