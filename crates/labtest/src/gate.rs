//! An input stream that stays open, without data, until released.
//!
//! Labs are launched with `--wait`, which makes the tool hold the container
//! until its stdin reaches end of stream. Handing it a closed or null stdin
//! would tear the lab down immediately, so when the caller supplies no input
//! the lab feeds it a [`ReadinessGate`] instead. Reads block until the gate is
//! released on close; from then on every read reports end of stream.

use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::release::Release;

/// Reader that blocks every read until released, then reports end of stream.
///
/// Clones share the same state, so releasing any clone releases them all.
#[derive(Debug, Clone, Default)]
pub struct ReadinessGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ReadinessGate {
    /// Creates a gate that is still holding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases the gate, waking every blocked reader.
    ///
    /// Releasing an already released gate does nothing.
    pub fn release(&self) {
        let (_, condvar) = &*self.inner;
        let mut released = self.lock();
        if *released {
            return;
        }
        *released = true;
        condvar.notify_all();
    }

    /// Returns `true` once the gate has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Read for ReadinessGate {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        let (_, condvar) = &*self.inner;
        let mut released = self.lock();
        while !*released {
            released = condvar
                .wait(released)
                .unwrap_or_else(|poison| poison.into_inner());
        }
        Ok(0)
    }
}

impl Release for ReadinessGate {
    fn name(&self) -> &str {
        "readiness gate"
    }

    fn release(&self) -> io::Result<()> {
        Self::release(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    fn spawn_reader(gate: &ReadinessGate) -> mpsc::Receiver<io::Result<usize>> {
        let (sender, receiver) = mpsc::channel();
        let mut reader = gate.clone();
        thread::spawn(move || {
            let mut buffer = [0_u8; 16];
            drop(sender.send(reader.read(&mut buffer)));
        });
        receiver
    }

    #[test]
    fn blocks_until_released() {
        let gate = ReadinessGate::new();
        let pending = spawn_reader(&gate);
        assert!(
            pending.recv_timeout(Duration::from_millis(50)).is_err(),
            "read should still be blocked"
        );
        gate.release();
        let result = pending
            .recv_timeout(Duration::from_secs(5))
            .expect("read should finish after release");
        assert_eq!(result.expect("read should not error"), 0);
    }

    #[test]
    fn reads_after_release_return_end_of_stream() {
        let mut gate = ReadinessGate::new();
        gate.release();
        let mut buffer = [7_u8; 4];
        assert_eq!(gate.read(&mut buffer).expect("read"), 0);
        assert_eq!(gate.read(&mut buffer).expect("read"), 0);
        assert_eq!(buffer, [7_u8; 4], "gate must never produce data");
        let mut contents = Vec::new();
        assert_eq!(gate.read_to_end(&mut contents).expect("read to end"), 0);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(8)]
    fn concurrent_releases_are_harmless(#[case] releasers: usize) {
        let gate = ReadinessGate::new();
        let readers: Vec<_> = (0..3).map(|_| spawn_reader(&gate)).collect();
        let handles: Vec<_> = (0..releasers)
            .map(|_| {
                let shared = gate.clone();
                thread::spawn(move || {
                    shared.release();
                    Release::release(&shared)
                })
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .expect("release thread panicked")
                .expect("release should not fail");
        }
        assert!(gate.is_released());
        for reader in readers {
            let result = reader
                .recv_timeout(Duration::from_secs(5))
                .expect("reader should wake");
            assert_eq!(result.expect("read should not error"), 0);
        }
    }
}
