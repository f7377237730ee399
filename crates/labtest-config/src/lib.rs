//! Shared configuration for lab fixtures.
//!
//! [`LabConfig`] gathers the handful of values the fixtures need from the
//! outside world: which tool binary runs labs, the tool's host designator
//! (which decides the [`AddressingMode`]), where service lab scripts live,
//! and how test logging is rendered.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a
//! configuration file, then `LABTEST_*` environment variables, then any
//! command-line style arguments handed to [`LabConfig::from_args`]. When no
//! layer sets a host designator, the tool's own `MLAB_HOST` variable is
//! used.
//!
//! The core never reads the environment itself. Harnesses call
//! [`LabConfig::from_env`] once, or build a configuration explicitly, and
//! pass the values down.

mod addressing;
mod defaults;
mod logging;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use addressing::{AddressingMode, UNIX_SOCKET_PREFIX};
pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_SCRIPTS_DIR, DEFAULT_TOOL, ENV_PREFIX, HOST_ENV_VAR,
    LOADER_PROGRAM, default_log_filter, default_log_format, default_scripts_dir, default_tool,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Configuration consumed by the lab core, fixtures and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LABTEST")]
pub struct LabConfig {
    /// Binary that runs and inspects labs.
    #[ortho_config(default = default_tool())]
    tool: String,
    /// Host designator of the lab tool.
    host: Option<String>,
    /// Directory holding service lab scripts.
    #[ortho_config(default = default_scripts_dir())]
    scripts_dir: PathBuf,
    /// Log filter expression for the tracing subscriber.
    #[ortho_config(default = default_log_filter())]
    log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    log_format: LogFormat,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            host: None,
            scripts_dir: default_scripts_dir(),
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl LabConfig {
    /// Loads the configuration from files and the process environment.
    ///
    /// The test binary's own arguments are never consulted.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`OrthoError`] when a layer holds a value of the
    /// wrong shape, such as an unknown log format.
    pub fn from_env() -> Result<Self, Arc<OrthoError>> {
        Self::from_args([OsString::from(LOADER_PROGRAM)])
    }

    /// Loads the configuration with `args` as the command-line layer.
    ///
    /// The first argument is the program name, as in `std::env::args_os`.
    ///
    /// # Errors
    ///
    /// See [`LabConfig::from_env`]; unknown flags are errors too.
    pub fn from_args<I>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = OsString>,
    {
        let arguments: Vec<OsString> = args.into_iter().collect();
        let loaded = Self::load_from_iter(arguments)?;
        Ok(loaded.with_host_fallback(std::env::var(HOST_ENV_VAR).ok()))
    }

    /// Uses `host` as the designator unless one is already set.
    ///
    /// Empty designators are ignored.
    #[must_use]
    pub fn with_host_fallback(mut self, host: Option<String>) -> Self {
        if self.host.is_none() {
            self.host = host.filter(|designator| !designator.is_empty());
        }
        self
    }

    /// Overrides the tool binary.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Overrides the host designator.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Overrides the scripts directory.
    #[must_use]
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Overrides the log filter expression.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Overrides the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Binary that runs and inspects labs.
    #[must_use]
    pub fn tool(&self) -> &OsStr {
        OsStr::new(&self.tool)
    }

    /// Host designator, when one was configured.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Addressing mode derived from the host designator.
    #[must_use]
    pub fn addressing_mode(&self) -> AddressingMode {
        AddressingMode::from_host(self.host())
    }

    /// Directory holding service lab scripts.
    #[must_use]
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Log filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
