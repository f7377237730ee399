//! Describes the process a lab runs.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// Boxed reader feeding a lab's stdin.
pub type LabInput = Box<dyn Read + Send>;

/// Boxed writer receiving a lab's stdout or stderr.
pub type LabOutput = Box<dyn Write + Send>;

/// Program, arguments and standard streams of a lab process.
///
/// The lab takes ownership of the specification when it is created, so it
/// cannot change afterwards. Absent streams are replaced when the lab starts:
/// stdin by a [`ReadinessGate`](crate::ReadinessGate), stdout and stderr by
/// discarding sinks.
pub struct LaunchSpec {
    program: OsString,
    args: Vec<OsString>,
    stdin: Option<LabInput>,
    stdout: Option<LabOutput>,
    stderr: Option<LabOutput>,
}

impl LaunchSpec {
    /// Starts a specification running `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feeds `input` to the process instead of holding stdin open.
    #[must_use]
    pub fn stdin(mut self, input: impl Read + Send + 'static) -> Self {
        self.stdin = Some(Box::new(input));
        self
    }

    /// Copies the process's stdout into `output`.
    #[must_use]
    pub fn stdout(mut self, output: impl Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(output));
        self
    }

    /// Copies the process's stderr into `output`.
    #[must_use]
    pub fn stderr(mut self, output: impl Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(output));
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub(crate) fn into_parts(self) -> LaunchParts {
        LaunchParts {
            program: self.program,
            args: self.args,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// A launch specification taken apart by the start sequence.
pub(crate) struct LaunchParts {
    pub(crate) program: OsString,
    pub(crate) args: Vec<OsString>,
    pub(crate) stdin: Option<LabInput>,
    pub(crate) stdout: Option<LabOutput>,
    pub(crate) stderr: Option<LabOutput>,
}

/// Builds the launch specification for a lab.
///
/// The launcher receives the side-channel file the process must write its
/// identifier to once it has detached successfully. The production launcher
/// is [`LabScript`](crate::LabScript); tests pass closures that start fake
/// processes honouring the same contract.
pub trait Launcher {
    /// Consumes the launcher, returning the specification for `id_file`.
    fn into_spec(self, id_file: &Path) -> LaunchSpec;
}

impl<F> Launcher for F
where
    F: FnOnce(&Path) -> LaunchSpec,
{
    fn into_spec(self, id_file: &Path) -> LaunchSpec {
        self(id_file)
    }
}
