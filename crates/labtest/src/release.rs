//! Auxiliary resources released when a lab closes.

use std::io;

/// A resource a lab releases exactly once when it closes.
///
/// Implementations must tolerate being released more than once and from any
/// thread.
pub trait Release: Send + Sync {
    /// Short name used when logging release failures.
    fn name(&self) -> &str;

    /// Releases the resource.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the release fails. The lab logs
    /// the error and continues tearing down.
    fn release(&self) -> io::Result<()>;
}
