//! Rendering of lab events inside test binaries.
//!
//! Labs, their output pumps and fixtures emit `tracing` events. Fixtures
//! built from a [`LabConfig`] call [`initialise`] on start, so those events
//! reach the test harness's captured output, filtered and formatted as
//! configured. A harness that already installed its own subscriber keeps it.

use labtest_config::{LabConfig, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, debug};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

const TELEMETRY_TARGET: &str = "labtest::telemetry";

static TELEMETRY: OnceCell<TelemetryHandle> = OnceCell::new();

/// Which subscriber renders lab events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryHandle {
    /// The subscriber built from the lab configuration.
    Installed(LogFormat),
    /// A subscriber installed earlier by the test harness.
    External,
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter {filter:?}: {message}")]
    Filter {
        /// The rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Routes lab events to the test harness the first time it is called.
///
/// Events go through libtest's output capture, so they appear next to the
/// failing test that produced them. They are filtered by
/// [`LabConfig::log_filter`] and rendered as [`LabConfig::log_format`] with
/// UTC timestamps and thread names. Later calls return the first outcome
/// whatever configuration they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the filter does not parse. The
/// next call tries again.
pub fn initialise(config: &LabConfig) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY.get_or_try_init(|| install(config)).copied()
}

/// The outcome of the first successful [`initialise`], if any.
#[must_use]
pub fn active() -> Option<TelemetryHandle> {
    TELEMETRY.get().copied()
}

fn install(config: &LabConfig) -> Result<TelemetryHandle, TelemetryError> {
    let subscriber = build_subscriber(config)?;
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!(target: TELEMETRY_TARGET, "keeping the harness subscriber");
        return Ok(TelemetryHandle::External);
    }
    Ok(TelemetryHandle::Installed(config.log_format()))
}

fn build_subscriber(
    config: &LabConfig,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            message: error.to_string(),
        })?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_test_writer()
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
