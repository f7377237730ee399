//! Splits lab output into lines for a logging callback.
//!
//! A [`LineLogger`] owns a worker thread that assembles the bytes written
//! through its [`LineWriter`] handles into lines and hands each complete line
//! to a callback. Lines are decoded only once complete, so multi-byte
//! characters split across writes arrive intact.
//!
//! A trailing line without a terminator is discarded when the logger closes;
//! it is reported at debug level and never delivered to the callback.

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::fixture::TestReporter;
use crate::release::Release;

/// Tracing target for line logging.
const LINES_TARGET: &str = "labtest::lines";

/// Callback receiving single lines of output.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

enum Message {
    Chunk(Vec<u8>),
    Close,
}

/// Routes written bytes, line by line, to a callback.
pub struct LineLogger {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LineLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineLogger")
            .field("closed", &lock(&self.sender).is_none())
            .finish()
    }
}

impl LineLogger {
    /// Starts a logger delivering each complete line to `callback`.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker thread cannot be spawned.
    pub fn new<F>(callback: F) -> io::Result<Self>
    where
        F: Fn(&str) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(String::from("labtest-lines"))
            .spawn(move || assemble_lines(&receiver, &callback))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns a writer feeding this logger.
    ///
    /// Writers obtained after the logger closed reject every write.
    #[must_use]
    pub fn writer(&self) -> LineWriter {
        LineWriter {
            sender: lock(&self.sender).clone(),
        }
    }

    /// Stops the worker, discarding any unterminated trailing line.
    ///
    /// Writers still alive start failing with [`io::ErrorKind::BrokenPipe`].
    /// Closing again does nothing.
    pub fn close(&self) {
        if let Some(sender) = lock(&self.sender).take() {
            drop(sender.send(Message::Close));
        }
        if let Some(worker) = lock(&self.worker).take()
            && worker.join().is_err()
        {
            warn!(target: LINES_TARGET, "line logger callback panicked");
        }
    }
}

impl Drop for LineLogger {
    fn drop(&mut self) {
        self.close();
    }
}

impl Release for LineLogger {
    fn name(&self) -> &str {
        "line logger"
    }

    fn release(&self) -> io::Result<()> {
        self.close();
        Ok(())
    }
}

/// Writable handle feeding a [`LineLogger`].
#[derive(Debug, Clone)]
pub struct LineWriter {
    sender: Option<Sender<Message>>,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender
            .as_ref()
            .ok_or_else(closed_error)?
            .send(Message::Chunk(buf.to_vec()))
            .map_err(|_| closed_error())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunk(bytes) => write!(f, "Chunk({} bytes)", bytes.len()),
            Self::Close => f.write_str("Close"),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "line logger closed")
}

fn assemble_lines<F>(receiver: &Receiver<Message>, callback: &F)
where
    F: Fn(&str),
{
    let mut pending: Vec<u8> = Vec::new();
    for message in receiver {
        match message {
            Message::Chunk(bytes) => {
                pending.extend_from_slice(&bytes);
                emit_complete_lines(&mut pending, callback);
            }
            Message::Close => break,
        }
    }
    if !pending.is_empty() {
        debug!(
            target: LINES_TARGET,
            bytes = pending.len(),
            "discarding unterminated trailing line"
        );
    }
}

fn emit_complete_lines<F>(pending: &mut Vec<u8>, callback: &F)
where
    F: Fn(&str),
{
    while let Some(position) = pending.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = pending.drain(..=position).collect();
        let unterminated = line.strip_suffix(b"\n").unwrap_or(&line);
        let text = unterminated.strip_suffix(b"\r").unwrap_or(unterminated);
        callback(&String::from_utf8_lossy(text));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Chooses the callback used to log a lab's output.
///
/// An explicit `logger` wins. Otherwise lines go to the bound test reporter
/// prefixed with `prefix`, and without a reporter they are emitted as
/// `tracing` events.
#[must_use]
pub fn default_logger(
    reporter: Option<&Arc<dyn TestReporter>>,
    prefix: &str,
    logger: Option<LogFn>,
) -> LogFn {
    if let Some(explicit) = logger {
        return explicit;
    }
    let label = prefix.to_owned();
    match reporter {
        Some(bound) => {
            let sink = Arc::clone(bound);
            Arc::new(move |line: &str| sink.log(&format!("{label} {line}")))
        }
        None => Arc::new(move |line: &str| {
            info!(target: LINES_TARGET, "{label} {line}");
        }),
    }
}
