//! Fake launchers, a fake tool and recording doubles shared by the suites.
//!
//! Processes are `sh -c` scripts. A script that detaches successfully prints
//! a line, writes its identifier to the side-channel file passed as `$1`,
//! closes its output and then blocks on stdin exactly like the real tool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use labtest_config::AddressingMode;
use mockall::mock;

use crate::error::LabError;
use crate::fixture::TestReporter;
use crate::lab::Lab;
use crate::launch::LaunchSpec;
use crate::tool::Inspector;

pub(crate) use crate::test_support::{LineRecorder, fake_tool};

/// Identifier written by [`DETACHING`].
pub(crate) const FAKE_IDENTIFIER: &str = "lab-7f3a";

/// Prints `starting`, writes the identifier and holds the lab open.
pub(crate) const DETACHING: &str = r#"echo starting
printf 'lab-7f3a\n' > "$1"
exec >/dev/null 2>&1
exec cat >/dev/null"#;

/// Exits at once without output.
pub(crate) const EXITING: &str = "exit 3";

/// Detaches without writing an identifier.
pub(crate) const SILENT: &str = r"exec >/dev/null 2>&1
exec cat >/dev/null";

/// Removes its side-channel file before detaching.
pub(crate) const VANISHING: &str = r#"rm -f "$1"
exec >/dev/null 2>&1
exec cat >/dev/null"#;

/// Inspection output matching the fake tool.
pub(crate) const INSPECTION: &[u8] = br#"[{"address":"10.1.0.7","ifname":"eth0"}] [{"internal":5432,"external":55000}]"#;

mock! {
    pub(crate) Inspector {}
    impl Inspector for Inspector {
        fn inspect(&self, identifier: &str) -> Result<Vec<u8>, LabError>;
    }
}

/// Launch specification running `script` with the side-channel file as `$1`.
pub(crate) fn shell(script: &'static str) -> impl FnOnce(&Path) -> LaunchSpec {
    move |id_file: &Path| {
        LaunchSpec::new("sh")
            .args(["-c", script, "fake-lab"])
            .arg(id_file)
    }
}

/// A lab running `script`, with an inspector that must never be used.
pub(crate) fn shell_lab(script: &'static str) -> Lab {
    let mut inspector = MockInspector::new();
    inspector.expect_inspect().never();
    Lab::new(shell(script), Arc::new(inspector), AddressingMode::Routed)
        .expect("allocate lab id file")
}

/// Reporter recording log lines and panicking with a marker on fatal.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    logs: Mutex<Vec<String>>,
    fatals: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub(crate) fn logs(&self) -> Vec<String> {
        self.logs.lock().expect("logs mutex").clone()
    }

    pub(crate) fn fatals(&self) -> Vec<String> {
        self.fatals.lock().expect("fatals mutex").clone()
    }
}

impl TestReporter for RecordingReporter {
    fn log(&self, message: &str) {
        self.logs.lock().expect("logs mutex").push(message.to_owned());
    }

    fn fatal(&self, message: &str) -> ! {
        self.fatals
            .lock()
            .expect("fatals mutex")
            .push(message.to_owned());
        panic!("fatal: {message}");
    }
}
