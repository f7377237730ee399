//! Stand-ins for the lab tool, shared with dependent crates' tests.
//!
//! Enabled by the `test-support` feature.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};

use crate::lines::LogFn;
use crate::tool::LabTool;

/// Address the fake tool reports for `eth0`.
pub const FAKE_LAB_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 1, 0, 7));

/// Shell script mimicking the lab tool.
///
/// `run --wait` prints `starting <script> <args>` to stdout and
/// `warming up` to stderr, writes `lab-<pid>` to the id file and holds the
/// lab open until stdin closes. Scripts whose path contains `broken` fail
/// instead. `run` without `--wait` echoes its arguments. `inspect` reports
/// `eth0` at [`FAKE_LAB_ADDRESS`] with ports 5432 and 2375 forwarded to
/// 55000 and 32768.
pub const FAKE_TOOL: &str = r#"command=$1
shift
case "$command" in
  run)
    if [ "$1" = "--wait" ]; then
      id_file=$3
      script=$4
      shift 4
      case "$script" in
        *broken*) echo "cannot start $script" >&2; exit 5 ;;
      esac
      echo "starting $script $*"
      echo "warming up" >&2
      printf 'lab-%s\n' "$$" > "$id_file"
      exec >/dev/null 2>&1
      exec cat >/dev/null
    fi
    echo "ran $*"
    ;;
  inspect)
    printf '%s ' '[{"address":"10.1.0.7","ifname":"eth0"}]'
    printf '%s\n' '[{"internal":5432,"external":55000},{"internal":2375,"external":32768}]'
    ;;
  *)
    echo "unknown command $command" >&2
    exit 64
    ;;
esac"#;

/// [`FAKE_TOOL`] run through `sh -c`.
#[must_use]
pub fn fake_tool() -> LabTool {
    LabTool::new("sh").with_base_args(["-c", FAKE_TOOL, "fake-mlab"])
}

/// Collects lines handed to a log callback.
#[derive(Debug, Clone, Default)]
pub struct LineRecorder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LineRecorder {
    /// A callback appending to this recorder.
    #[must_use]
    pub fn callback(&self) -> LogFn {
        let lines = Arc::clone(&self.lines);
        Arc::new(move |line: &str| {
            lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_owned());
        })
    }

    /// Lines recorded so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
