//! One-shot completion signal for a lab process.
//!
//! The signal makes exactly one transition from pending to fired. A
//! compare-and-swap on an atomic flag decides which caller performs the
//! transition; that caller stores the [`ExitDescription`] and wakes every
//! waiter through a condition variable. Later calls to [`CompletionSignal::fire`]
//! are no-ops, so the exit monitor and the start sequence may both report an
//! exit without coordinating.

use std::fmt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How a lab process came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDescription {
    /// The process exited with the given status.
    Exited(ExitStatus),
    /// The process was never spawned.
    SpawnFailed(String),
    /// The process state could not be observed.
    MonitorFailed(String),
    /// The lab was closed before its process was started.
    Abandoned,
}

impl ExitDescription {
    /// Exit status of the process when it exited normally or was signalled.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        match self {
            Self::Exited(status) => Some(*status),
            Self::SpawnFailed(_) | Self::MonitorFailed(_) | Self::Abandoned => None,
        }
    }
}

impl fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(status) => write!(f, "{status}"),
            Self::SpawnFailed(message) => write!(f, "failed to spawn: {message}"),
            Self::MonitorFailed(message) => write!(f, "lost track of process: {message}"),
            Self::Abandoned => f.write_str("closed before start"),
        }
    }
}

/// One-shot broadcast fired when a lab process has ended.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    fired: AtomicBool,
    outcome: Mutex<Option<ExitDescription>>,
    condvar: Condvar,
}

impl CompletionSignal {
    /// Creates a pending signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal with the given outcome.
    ///
    /// Returns `true` when this call performed the transition. Every later
    /// call returns `false` and leaves the recorded outcome untouched.
    ///
    /// The outcome is stored before the lock is released, so a caller that
    /// sees [`CompletionSignal::is_fired`] return `true` always finds it in
    /// [`CompletionSignal::outcome`].
    pub fn fire(&self, outcome: ExitDescription) -> bool {
        let mut slot = self.lock();
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *slot = Some(outcome);
        self.condvar.notify_all();
        true
    }

    /// Returns `true` once the signal has fired. Never blocks.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Blocks until the signal fires and returns the recorded outcome.
    pub fn wait(&self) -> ExitDescription {
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .condvar
                .wait(slot)
                .unwrap_or_else(|poison| poison.into_inner());
        }
    }

    /// Blocks until the signal fires or `timeout` elapses.
    ///
    /// Returns the outcome when the signal fired first. A timeout too large
    /// to represent as a deadline waits without limit.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitDescription> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut slot = self.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Some(outcome.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .condvar
                .wait_timeout(slot, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poison| poison.into_inner().0);
        }
    }

    /// Outcome recorded by the firing call, if the signal has fired.
    #[must_use]
    pub fn outcome(&self) -> Option<ExitDescription> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExitDescription>> {
        self.outcome
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
