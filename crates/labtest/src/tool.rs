//! Adapter for the external tool that runs and inspects labs.
//!
//! The tool is treated as a black box with three invocations:
//!
//! - `run --wait --id <idfile> <script> [args...]` starts a lab, writes the
//!   container identifier to `idfile` once it has detached, and holds the
//!   container until its stdin reaches end of stream;
//! - `inspect -f <template> <identifier>` prints the lab's interfaces and
//!   exposed ports as two JSON documents;
//! - `run <script> [args...]` runs a collaborator lab to completion.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use labtest_config::LabConfig;
use tracing::debug;

use crate::error::LabError;
use crate::launch::{LaunchSpec, Launcher};
use crate::lines::{LineLogger, LineWriter};

/// Tracing target for tool invocations.
const TOOL_TARGET: &str = "labtest::tool";

/// Inspection template yielding the interface and port documents.
pub const INSPECT_TEMPLATE: &str =
    "{{json .config.Network.interfaces}} {{json .config.Network.exposed}}";

/// Source of the raw network description of a running lab.
///
/// The production implementation is [`LabTool`]. Tests implement this trait
/// to return canned documents and count invocations.
pub trait Inspector: Send + Sync {
    /// Returns the two JSON documents describing the lab's network.
    ///
    /// # Errors
    ///
    /// Returns a [`LabError`] when the inspection cannot be performed.
    fn inspect(&self, identifier: &str) -> Result<Vec<u8>, LabError>;
}

/// Invokes the lab tool binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabTool {
    program: OsString,
    base_args: Vec<OsString>,
}

impl LabTool {
    /// Wraps the given tool binary.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    /// Wraps the tool binary named by the configuration.
    #[must_use]
    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.tool())
    }

    /// Adds arguments placed before every subcommand, for wrappers such as
    /// `sh -c <script> <name>`.
    #[must_use]
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Tool binary.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Prepares a detached run of `script`.
    #[must_use]
    pub fn script(&self, script: impl Into<PathBuf>) -> LabScript {
        LabScript {
            tool: self.clone(),
            script: script.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Runs `script` to completion, logging its output line by line.
    ///
    /// Success is decided by the exit status alone. Output that cannot be
    /// delivered to `logger`, for instance because it was closed, is drained
    /// and dropped so the command still runs to completion.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Collaborator`] when the command cannot be spawned
    /// or reaped and [`LabError::CollaboratorFailed`] when it exits
    /// unsuccessfully.
    pub fn run<I, S>(&self, script: &Path, args: I, logger: &LineLogger) -> Result<(), LabError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut command = self.command();
        command
            .arg("run")
            .arg(script)
            .args(args.into_iter().map(Into::into))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(
            target: TOOL_TARGET,
            program = ?self.program,
            script = %script.display(),
            "running collaborator"
        );
        let collaborator_error = |source: io::Error| LabError::Collaborator {
            program: self.program.clone(),
            source: Arc::new(source),
        };
        let mut child = command.spawn().map_err(collaborator_error)?;
        let stderr_pipe = child.stderr.take();
        let stderr_writer = logger.writer();
        let stderr_pump = thread::Builder::new()
            .name(String::from("labtest-collaborator-stderr"))
            .spawn(move || {
                if let Some(pipe) = stderr_pipe {
                    forward_output(pipe, stderr_writer, "stderr");
                }
            });
        if let Some(pipe) = child.stdout.take() {
            forward_output(pipe, logger.writer(), "stdout");
        }
        match stderr_pump {
            Ok(pump) => {
                if pump.join().is_err() {
                    debug!(target: TOOL_TARGET, "collaborator stderr pump panicked");
                }
            }
            Err(error) => {
                debug!(target: TOOL_TARGET, error = %error, "collaborator stderr not forwarded");
            }
        }
        let status = child.wait().map_err(collaborator_error)?;
        if status.success() {
            return Ok(());
        }
        Err(LabError::CollaboratorFailed {
            program: self.program.clone(),
            status: status.code(),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.base_args);
        command
    }
}

/// Copies `pipe` into `sink` until end of stream.
///
/// Once the sink rejects a write the rest of the stream is read and
/// discarded, so the child never blocks on a full pipe.
fn forward_output(mut pipe: impl Read, mut sink: LineWriter, stream: &'static str) {
    if let Err(error) = io::copy(&mut pipe, &mut sink) {
        debug!(
            target: TOOL_TARGET,
            stream,
            error = %error,
            "collaborator output dropped"
        );
        if let Err(drain_error) = io::copy(&mut pipe, &mut io::sink()) {
            debug!(target: TOOL_TARGET, stream, error = %drain_error, "collaborator output lost");
        }
    }
}

impl Inspector for LabTool {
    fn inspect(&self, identifier: &str) -> Result<Vec<u8>, LabError> {
        let output = self
            .command()
            .args(["inspect", "-f", INSPECT_TEMPLATE, identifier])
            .stdin(Stdio::null())
            .output()
            .map_err(|source| LabError::Inspect {
                identifier: identifier.to_owned(),
                source: Arc::new(source),
            })?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        if !output.status.success() {
            return Err(LabError::InspectFailed {
                identifier: identifier.to_owned(),
                status: output.status.code(),
                output: String::from_utf8_lossy(&combined).trim().to_owned(),
            });
        }
        debug!(
            target: TOOL_TARGET,
            identifier,
            bytes = combined.len(),
            "inspected lab"
        );
        Ok(combined)
    }
}

/// A detached run of a lab script, ready to hand to [`Lab::new`](crate::Lab::new).
pub struct LabScript {
    tool: LabTool,
    script: PathBuf,
    args: Vec<OsString>,
    stdin: Option<Box<dyn Read + Send>>,
    stdout: Option<Box<dyn Write + Send>>,
    stderr: Option<Box<dyn Write + Send>>,
}

impl LabScript {
    /// Appends script arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feeds `input` to the lab instead of holding stdin open.
    #[must_use]
    pub fn stdin(mut self, input: impl Read + Send + 'static) -> Self {
        self.stdin = Some(Box::new(input));
        self
    }

    /// Copies the lab's stdout into `output`.
    #[must_use]
    pub fn stdout(mut self, output: impl Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(output));
        self
    }

    /// Copies the lab's stderr into `output`.
    #[must_use]
    pub fn stderr(mut self, output: impl Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(output));
        self
    }
}

impl std::fmt::Debug for LabScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabScript")
            .field("tool", &self.tool)
            .field("script", &self.script)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl Launcher for LabScript {
    fn into_spec(self, id_file: &Path) -> LaunchSpec {
        let Self {
            tool,
            script,
            args,
            stdin,
            stdout,
            stderr,
        } = self;
        let mut spec = LaunchSpec::new(tool.program)
            .args(tool.base_args)
            .args(["run", "--wait", "--id"])
            .arg(id_file)
            .arg(script)
            .args(args);
        if let Some(input) = stdin {
            spec = spec.stdin(input);
        }
        if let Some(output) = stdout {
            spec = spec.stdout(output);
        }
        if let Some(output) = stderr {
            spec = spec.stderr(output);
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rstest::rstest;

    use super::*;

    #[test]
    fn script_builds_detached_run_invocation() {
        let spec = LabTool::new("mlab")
            .script("/labs/postgres.mlab")
            .args(["-port", "0"])
            .into_spec(Path::new("/tmp/labtest.abc"));
        assert_eq!(spec.program(), "mlab");
        let expected: Vec<OsString> = [
            "run",
            "--wait",
            "--id",
            "/tmp/labtest.abc",
            "/labs/postgres.mlab",
            "-port",
            "0",
        ]
        .map(OsString::from)
        .into();
        assert_eq!(spec.arguments(), expected.as_slice());
    }

    #[test]
    fn base_args_precede_subcommands() {
        let spec = LabTool::new("sudo")
            .with_base_args(["mlab"])
            .script("dind.mlab")
            .into_spec(Path::new("/tmp/id"));
        assert_eq!(spec.program(), "sudo");
        assert_eq!(
            spec.arguments().first().map(OsString::as_os_str),
            Some(OsStr::new("mlab"))
        );
    }

    #[test]
    fn from_config_uses_configured_tool() {
        let config = LabConfig::default().with_tool("/opt/bin/mlab");
        assert_eq!(LabTool::from_config(&config).program(), "/opt/bin/mlab");
    }

    #[cfg(unix)]
    #[test]
    fn inspect_combines_output_and_checks_status() {
        let tool = LabTool::new("sh").with_base_args([
            "-c",
            r#"if [ "$4" = "good" ]; then printf '[] '; printf '[]' >&2; else echo nope; exit 4; fi"#,
            "fake-tool",
        ]);
        let output = tool.inspect("good").expect("inspect succeeds");
        assert_eq!(output, b"[] []");
        let error = tool.inspect("bad").expect_err("inspect fails");
        match error {
            LabError::InspectFailed { status, output, .. } => {
                assert_eq!(status, Some(4));
                assert_eq!(output, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_routes_output_and_reports_failure() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let logger = LineLogger::new(move |line| {
            sink.lock().expect("lines mutex").push(line.to_owned());
        })
        .expect("line logger");
        let tool = LabTool::new("sh").with_base_args([
            "-c",
            r#"echo "deploying $2"; echo "warning" >&2; exit "$3""#,
            "fake-tool",
        ]);

        tool.run(Path::new("sqitch.mlab"), ["0"], &logger)
            .expect("zero exit succeeds");
        let error = tool
            .run(Path::new("sqitch.mlab"), ["3"], &logger)
            .expect_err("non-zero exit fails");
        logger.close();

        assert!(matches!(
            error,
            LabError::CollaboratorFailed {
                status: Some(3),
                ..
            }
        ));
        let seen = lines.lock().expect("lines mutex").clone();
        assert_eq!(
            seen.iter()
                .filter(|line| *line == "deploying sqitch.mlab")
                .count(),
            2,
            "stdout lines missing: {seen:?}"
        );
        assert!(seen.iter().any(|line| line == "warning"), "{seen:?}");
    }

    #[cfg(unix)]
    #[rstest]
    #[case::success("0", None)]
    #[case::failure("3", Some(3))]
    fn run_judges_closed_logger_runs_by_exit_status(
        #[case] code: &str,
        #[case] failed_with: Option<i32>,
    ) {
        let logger = LineLogger::new(|_| {}).expect("line logger");
        logger.close();
        let tool = LabTool::new("sh").with_base_args([
            "-c",
            r#"seq 1 20000; echo "warning" >&2; exit "$3""#,
            "fake-tool",
        ]);

        let outcome = tool.run(Path::new("sqitch.mlab"), [code], &logger);

        match (outcome, failed_with) {
            (Ok(()), None) => {}
            (Err(LabError::CollaboratorFailed { status, .. }), Some(expected)) => {
                assert_eq!(status, Some(expected));
            }
            (other, _) => panic!("unexpected outcome: {other:?}"),
        }
    }
}
