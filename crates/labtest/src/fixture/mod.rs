//! Test-facing composition of a lab, its output logging and error policy.
//!
//! A [`Fixture`] creates and starts a lab in one call, routes the lab's
//! output through a [`LineLogger`], and ties the result to an optional
//! [`TestReporter`]. With a reporter bound, start and resolution failures end
//! the test through [`TestReporter::fatal`], so test bodies need not check
//! errors. Without one, errors are returned as usual.

use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use labtest_config::{AddressingMode, LabConfig};
use tracing::{info, warn};

use crate::error::LabError;
use crate::lab::Lab;
use crate::launch::Launcher;
use crate::lines::{LineLogger, LogFn, default_logger};
use crate::telemetry;
use crate::tool::{Inspector, LabTool};

/// Tracing target for fixture events.
const FIXTURE_TARGET: &str = "labtest::fixture";

/// Receives fixture logs and aborts the current test on fatal errors.
pub trait TestReporter: Send + Sync {
    /// Records an informational line.
    fn log(&self, message: &str);

    /// Ends the current test with `message`.
    fn fatal(&self, message: &str) -> !;
}

/// Reporter for Rust tests: logs through `tracing` and panics on fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicReporter;

impl TestReporter for PanicReporter {
    fn log(&self, message: &str) {
        info!(target: FIXTURE_TARGET, "{message}");
    }

    /// # Panics
    ///
    /// Always, with `message`.
    fn fatal(&self, message: &str) -> ! {
        panic!("{message}");
    }
}

/// What a fixture runs and how its output is logged.
#[derive(Clone)]
pub struct FixtureSpec {
    name: String,
    tool: LabTool,
    script: PathBuf,
    args: Vec<OsString>,
    logger: Option<LogFn>,
    mode: AddressingMode,
    telemetry: Option<LabConfig>,
}

impl std::fmt::Debug for FixtureSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureSpec")
            .field("name", &self.name)
            .field("tool", &self.tool)
            .field("script", &self.script)
            .field("args", &self.args)
            .field("logger", &self.logger.is_some())
            .field("mode", &self.mode)
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

impl FixtureSpec {
    /// Runs `script` with `tool`, prefixing output lines with `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, tool: LabTool, script: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            tool,
            script: script.into(),
            args: Vec::new(),
            logger: None,
            mode: AddressingMode::default(),
            telemetry: None,
        }
    }

    /// Runs `script` with the configured tool and addressing mode.
    ///
    /// Relative script paths are resolved against the configured scripts
    /// directory. Starting the fixture initialises [`telemetry`] from
    /// `config`.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &LabConfig, script: &Path) -> Self {
        let mut spec = Self::new(
            name,
            LabTool::from_config(config),
            config.scripts_dir().join(script),
        )
        .with_addressing_mode(config.addressing_mode());
        spec.telemetry = Some(config.clone());
        spec
    }

    /// Appends script arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sends output lines to `logger` instead of the default destination.
    #[must_use]
    pub fn with_logger(mut self, logger: LogFn) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Runs the script with `tool` instead.
    #[must_use]
    pub fn with_tool(mut self, tool: LabTool) -> Self {
        self.tool = tool;
        self
    }

    /// Overrides the addressing mode.
    #[must_use]
    pub const fn with_addressing_mode(mut self, mode: AddressingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Output line prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Script the tool runs.
    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Script arguments.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }
}

/// A started lab bound to an optional test reporter.
pub struct Fixture {
    name: String,
    lab: Lab,
    reporter: Option<Arc<dyn TestReporter>>,
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("lab", &self.lab)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

impl Fixture {
    /// Creates and starts the lab described by `spec`.
    ///
    /// A spec built with [`FixtureSpec::from_config`] first routes lab
    /// events to the test harness; a bad log filter is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Lab::new`] or [`Lab::start`]. With a reporter
    /// bound, the error is reported as fatal instead.
    pub fn start(
        spec: FixtureSpec,
        reporter: Option<Arc<dyn TestReporter>>,
    ) -> Result<Self, LabError> {
        let FixtureSpec {
            name,
            tool,
            script,
            args,
            logger,
            mode,
            telemetry: logging,
        } = spec;
        if let Some(config) = logging
            && let Err(error) = telemetry::initialise(&config)
        {
            warn!(target: FIXTURE_TARGET, %error, "lab events are not rendered");
        }
        let inspector: Arc<dyn Inspector> = Arc::new(tool.clone());
        let launcher = tool.script(script).args(args);
        Self::start_with(&name, launcher, inspector, mode, logger, reporter)
    }

    /// Creates and starts a lab from injected collaborators.
    ///
    /// The lab's stdout and stderr are routed, line by line, to `logger`, or
    /// to the reporter or `tracing` when no logger is given, prefixed with
    /// `name`. A lab that fails to start is closed before returning.
    ///
    /// # Errors
    ///
    /// As for [`Fixture::start`].
    pub fn start_with(
        name: &str,
        launcher: impl Launcher,
        inspector: Arc<dyn Inspector>,
        mode: AddressingMode,
        logger: Option<LogFn>,
        reporter: Option<Arc<dyn TestReporter>>,
    ) -> Result<Self, LabError> {
        match Self::launch(name, launcher, inspector, mode, logger, reporter.as_ref()) {
            Ok(lab) => Ok(Self {
                name: name.to_owned(),
                lab,
                reporter,
            }),
            Err(error) => {
                if let Some(bound) = &reporter {
                    bound.fatal(&format!("error starting {name} lab: {error}"));
                }
                Err(error)
            }
        }
    }

    fn launch(
        name: &str,
        launcher: impl Launcher,
        inspector: Arc<dyn Inspector>,
        mode: AddressingMode,
        logger: Option<LogFn>,
        reporter: Option<&Arc<dyn TestReporter>>,
    ) -> Result<Lab, LabError> {
        let output_log = default_logger(reporter, name, logger);
        let lines = LineLogger::new(move |line| output_log(line)).map_err(|source| {
            LabError::Thread {
                name: "labtest-lines",
                source: Arc::new(source),
            }
        })?;
        let stdout = lines.writer();
        let stderr = lines.writer();
        let wired = move |id_file: &Path| {
            launcher
                .into_spec(id_file)
                .stdout(stdout)
                .stderr(stderr)
        };
        let lab = Lab::new(wired, inspector, mode)?;
        lab.register(Box::new(lines));
        if let Some(bound) = reporter {
            let sink = Arc::clone(bound);
            lab.set_logger(Arc::new(move |message: &str| sink.log(message)));
        }
        // Dropping the lab on failure closes it.
        lab.start()?;
        Ok(lab)
    }

    /// Closes the underlying lab. Safe to call more than once.
    pub fn close(&self) {
        self.lab.log(&format!("{} close", self.name));
        self.lab.close();
    }

    /// Logs an internal event through the lab's logger.
    pub fn log(&self, message: &str) {
        self.lab.log(message);
    }

    /// Address and port reaching `port` inside the lab.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Lab::access_point`]. With a reporter bound,
    /// the error is reported as fatal instead.
    pub fn access_point(&self, port: u16) -> Result<SocketAddr, LabError> {
        self.checked(self.lab.access_point(port))
    }

    /// The lab's primary interface address.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Lab::net_config`] and
    /// [`LabError::NoPrimaryAddress`] when the lab reported no interfaces.
    /// With a reporter bound, the error is reported as fatal instead.
    pub fn primary_address(&self) -> Result<IpAddr, LabError> {
        let resolved = self.lab.primary_address().and_then(|address| {
            address.ok_or_else(|| LabError::NoPrimaryAddress {
                identifier: self.lab.identifier().unwrap_or_default().to_owned(),
            })
        });
        self.checked(resolved)
    }

    /// The underlying lab.
    #[must_use]
    pub const fn lab(&self) -> &Lab {
        &self.lab
    }

    /// Output line prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn checked<T>(&self, result: Result<T, LabError>) -> Result<T, LabError> {
        if let (Err(error), Some(bound)) = (&result, &self.reporter) {
            bound.fatal(&format!("{}: {error}", self.name));
        }
        result
    }
}
