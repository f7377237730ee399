//! Exit monitor for a lab process.
//!
//! The child stays in a shared slot so `close` can kill it while the monitor
//! is running; the monitor therefore polls with `try_wait` under the lock
//! instead of blocking in `wait`.

use std::io;
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use super::{LAB_TARGET, POLL_INTERVAL, lock};
use crate::signal::{CompletionSignal, ExitDescription};

/// Starts the monitor thread, which fires `signal` once the child has ended.
pub(super) fn spawn(
    child: Arc<Mutex<Option<Child>>>,
    signal: Arc<CompletionSignal>,
) -> io::Result<()> {
    thread::Builder::new()
        .name(String::from("labtest-exit-watch"))
        .spawn(move || {
            while poll(&child, &signal).is_none() {
                thread::sleep(POLL_INTERVAL);
            }
        })
        .map(drop)
}

/// Checks the child once, firing `signal` when it has ended.
///
/// Returns the recorded outcome once the signal has fired, by this call or
/// any earlier one.
pub(super) fn poll(
    child: &Mutex<Option<Child>>,
    signal: &CompletionSignal,
) -> Option<ExitDescription> {
    if signal.is_fired() {
        return Some(signal.wait());
    }
    let mut slot = lock(child);
    let process = slot.as_mut()?;
    match process.try_wait() {
        Ok(Some(status)) => {
            if signal.fire(ExitDescription::Exited(status)) {
                debug!(target: LAB_TARGET, pid = process.id(), %status, "lab process exited");
            }
        }
        Ok(None) => return None,
        Err(error) => {
            warn!(
                target: LAB_TARGET,
                pid = process.id(),
                error = %error,
                "failed to poll lab process"
            );
            signal.fire(ExitDescription::MonitorFailed(error.to_string()));
        }
    }
    drop(slot);
    Some(signal.wait())
}
