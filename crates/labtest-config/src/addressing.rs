//! Selects how a started lab is reached from the test process.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Prefix marking a host designator as a local Unix socket.
pub const UNIX_SOCKET_PREFIX: &str = "unix:";

/// How the test process reaches services running inside a lab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AddressingMode {
    /// The lab's own interface address is reachable; use it with the
    /// untranslated internal port.
    #[default]
    Routed,
    /// Only the loopback address is reachable; use the port the tool exposed
    /// for the internal port.
    Forwarded,
}

impl AddressingMode {
    /// Derives the mode from the tool's host designator.
    ///
    /// Routed networking is selected unless the designator names a Unix
    /// socket. An absent designator selects routed networking.
    #[must_use]
    pub fn from_host(host: Option<&str>) -> Self {
        match host {
            Some(value) if value.starts_with(UNIX_SOCKET_PREFIX) => Self::Forwarded,
            _ => Self::Routed,
        }
    }

    /// Returns `true` when the loopback address and mapped ports must be used.
    #[must_use]
    pub const fn needs_forwarding(self) -> bool {
        matches!(self, Self::Forwarded)
    }
}
