//! The start sequence: spawn, drain output, check readiness, read identifier.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::process::{ChildStdin, ChildStderr, Command, Stdio};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use super::{LAB_TARGET, Lab, LabState, READINESS_WINDOW, lock, watch};
use crate::error::LabError;
use crate::gate::ReadinessGate;
use crate::launch::{LabInput, LabOutput, LaunchParts};
use crate::signal::ExitDescription;

/// Runs the start sequence, returning the lab identifier.
pub(super) fn run(lab: &Lab, parts: LaunchParts) -> Result<String, LabError> {
    let LaunchParts {
        program,
        args,
        stdin,
        stdout,
        stderr,
    } = parts;

    let input: LabInput = if let Some(supplied) = stdin {
        supplied
    } else {
        let gate = ReadinessGate::new();
        lab.register(Box::new(gate.clone()));
        Box::new(gate)
    };

    let mut command = Command::new(&program);
    command
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(if stderr.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            lab.signal
                .fire(ExitDescription::SpawnFailed(source.to_string()));
            return Err(spawn_error(program, source));
        }
    };
    debug!(
        target: LAB_TARGET,
        pid = child.id(),
        program = ?program,
        "lab process spawned"
    );
    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    *lock(&lab.child) = Some(child);
    if lab.state() == LabState::Closed {
        lab.terminate();
    }

    watch::spawn(Arc::clone(&lab.child), Arc::clone(&lab.signal))
        .map_err(|source| thread_error("labtest-exit-watch", source))?;

    spawn_stdin_pump(
        input,
        stdin_pipe.ok_or(LabError::PipeAttach { stream: "stdin" })?,
    )?;
    if let Some(error_sink) = stderr {
        spawn_stderr_pump(
            stderr_pipe.ok_or(LabError::PipeAttach { stream: "stderr" })?,
            error_sink,
        )?;
    }

    let mut output = stdout_pipe.ok_or(LabError::PipeAttach { stream: "stdout" })?;
    let mut sink = stdout.unwrap_or_else(|| Box::new(io::sink()));
    io::copy(&mut output, &mut sink)
        .and_then(|_| sink.flush())
        .map_err(|source| LabError::OutputCopy {
            source: Arc::new(source),
        })?;
    debug!(target: LAB_TARGET, "lab output closed");

    if let Some(description) = exited(lab) {
        return Err(LabError::PrematureExit { description });
    }
    if let Some(description) = lab.signal.wait_timeout(READINESS_WINDOW) {
        return Err(LabError::PrematureExit { description });
    }
    if let Some(description) = watch::poll(&lab.child, &lab.signal) {
        return Err(LabError::PrematureExit { description });
    }

    read_identifier(lab)
}

fn exited(lab: &Lab) -> Option<ExitDescription> {
    lab.signal.is_fired().then(|| lab.signal.wait())
}

fn read_identifier(lab: &Lab) -> Result<String, LabError> {
    let contents = fs::read_to_string(&lab.id_file).map_err(|source| LabError::IdentifierRead {
        path: lab.id_file.clone(),
        source: Arc::new(source),
    })?;
    let identifier = contents.trim();
    if identifier.is_empty() {
        return Err(LabError::EmptyIdentifier {
            path: lab.id_file.clone(),
        });
    }
    Ok(identifier.to_owned())
}

fn spawn_stdin_pump(mut input: LabInput, mut pipe: ChildStdin) -> Result<(), LabError> {
    thread::Builder::new()
        .name(String::from("labtest-stdin"))
        .spawn(move || {
            if let Err(error) = io::copy(&mut input, &mut pipe) {
                debug!(target: LAB_TARGET, error = %error, "lab stdin pump stopped");
            }
        })
        .map(drop)
        .map_err(|source| thread_error("labtest-stdin", source))
}

fn spawn_stderr_pump(mut pipe: ChildStderr, mut sink: LabOutput) -> Result<(), LabError> {
    thread::Builder::new()
        .name(String::from("labtest-stderr"))
        .spawn(move || {
            if let Err(error) = copy_to(&mut pipe, &mut sink) {
                debug!(target: LAB_TARGET, error = %error, "lab stderr pump stopped");
            }
        })
        .map(drop)
        .map_err(|source| thread_error("labtest-stderr", source))
}

fn copy_to(reader: &mut impl Read, writer: &mut LabOutput) -> io::Result<()> {
    io::copy(reader, writer)?;
    writer.flush()
}

fn spawn_error(program: OsString, source: io::Error) -> LabError {
    if source.kind() == io::ErrorKind::NotFound {
        LabError::ExecutableNotFound {
            program,
            source: Arc::new(source),
        }
    } else {
        LabError::Spawn {
            program,
            source: Arc::new(source),
        }
    }
}

fn thread_error(name: &'static str, source: io::Error) -> LabError {
    LabError::Thread {
        name,
        source: Arc::new(source),
    }
}
