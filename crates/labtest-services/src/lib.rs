//! Ready-made lab fixtures for services tests commonly depend on.
//!
//! Each service runs a fixed lab script from the configured scripts
//! directory and knows which port inside the lab it listens on:
//!
//! - [`DockerLab`] runs a Docker daemon (`dind.mlab`, port 2375);
//! - [`PostgresLab`] runs a PostgreSQL server (`postgres.mlab`, port 5432).
//!
//! [`ServiceOptions`] carries what a test may vary: the reporter that turns
//! failures fatal, a callback for the service's output, and the tool that
//! runs the script.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use labtest::{Fixture, FixtureSpec, LabConfig, LabError, LabTool, LogFn, TestReporter};

mod docker;
mod postgres;

pub use docker::{DOCKER_PORT, DOCKER_SCRIPT, DockerLab};
pub use postgres::{POSTGRES_PORT, POSTGRES_SCRIPT, PostgresLab};

/// Optional collaborators for a service fixture.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    reporter: Option<Arc<dyn TestReporter>>,
    logger: Option<LogFn>,
    tool: Option<LabTool>,
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("reporter", &self.reporter.is_some())
            .field("logger", &self.logger.is_some())
            .field("tool", &self.tool)
            .finish()
    }
}

impl ServiceOptions {
    /// No reporter, default output logging and the configured tool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reporter: None,
            logger: None,
            tool: None,
        }
    }

    /// Reports start and resolution failures as fatal through `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn TestReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Sends the service's output lines to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: LogFn) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Runs the service script with `tool` instead of the configured one.
    #[must_use]
    pub fn with_tool(mut self, tool: LabTool) -> Self {
        self.tool = Some(tool);
        self
    }

    pub(crate) fn start(
        self,
        name: &str,
        config: &LabConfig,
        script: &str,
        args: Vec<OsString>,
    ) -> Result<Fixture, LabError> {
        let Self {
            reporter,
            logger,
            tool,
        } = self;
        let mut spec = FixtureSpec::from_config(name, config, Path::new(script)).with_args(args);
        if let Some(custom) = tool {
            spec = spec.with_tool(custom);
        }
        if let Some(callback) = logger {
            spec = spec.with_logger(callback);
        }
        Fixture::start(spec, reporter)
    }
}

#[cfg(all(test, unix))]
mod test_support;
