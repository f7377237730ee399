use std::path::PathBuf;

use crate::logging::LogFormat;

/// Binary invoked to run and inspect labs when nothing overrides it.
pub const DEFAULT_TOOL: &str = "mlab";

/// Directory searched for service lab scripts when nothing overrides it.
pub const DEFAULT_SCRIPTS_DIR: &str = "labs";

/// Default log filter expression used by test harnesses.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the environment variables read by the loader.
pub const ENV_PREFIX: &str = "LABTEST";

/// Host designator variable exported by the lab tool itself.
pub const HOST_ENV_VAR: &str = "MLAB_HOST";

/// Program name handed to the loader in place of command-line arguments.
pub const LOADER_PROGRAM: &str = "labtest";

/// Default tool binary.
pub fn default_tool() -> String {
    DEFAULT_TOOL.to_owned()
}

/// Default scripts directory.
pub fn default_scripts_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SCRIPTS_DIR)
}

/// Default log filter expression.
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
