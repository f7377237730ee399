//! Configurations for the service tests.

use labtest::LabConfig;

pub(crate) use labtest::test_support::{FAKE_LAB_ADDRESS as LAB_ADDRESS, LineRecorder, fake_tool};

/// Configuration reaching labs on their own addresses.
pub(crate) fn routed() -> LabConfig {
    LabConfig::default().with_scripts_dir("/srv/labs")
}

/// Configuration reaching labs through forwarded loopback ports.
pub(crate) fn forwarded() -> LabConfig {
    routed().with_host("unix:///run/mlab.sock")
}
