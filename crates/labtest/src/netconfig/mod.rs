//! Network configuration of a running lab.
//!
//! The inspection output is two JSON documents back to back: the lab's
//! interfaces, then its exposed ports. Both are parsed from a single
//! streaming deserializer so whitespace between them does not matter.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use labtest_config::AddressingMode;
use serde::Deserialize;

use crate::error::LabError;

/// Interface preferred when picking the primary address.
pub const PRIMARY_INTERFACE: &str = "eth0";

#[derive(Debug, Deserialize)]
struct InterfaceRecord {
    address: String,
    ifname: String,
}

#[derive(Debug, Deserialize)]
struct PortRecord {
    internal: u16,
    external: u16,
}

/// Interfaces and port mappings of a lab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetConfig {
    interfaces: HashMap<String, IpAddr>,
    exposed_ports: HashMap<u16, u16>,
}

impl NetConfig {
    /// Builds a configuration from already parsed values.
    #[must_use]
    pub fn new(interfaces: HashMap<String, IpAddr>, exposed_ports: HashMap<u16, u16>) -> Self {
        Self {
            interfaces,
            exposed_ports,
        }
    }

    /// Parses the output of the inspection command.
    ///
    /// A `null` document is read as an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::MalformedNetConfig`] when either document is not
    /// valid JSON of the expected shape, and [`LabError::InvalidAddress`]
    /// when an interface address is not an IP literal.
    pub fn parse(output: &[u8]) -> Result<Self, LabError> {
        let mut deserializer = serde_json::Deserializer::from_slice(output);
        let interface_records =
            Option::<Vec<InterfaceRecord>>::deserialize(&mut deserializer).map_err(|source| {
                LabError::MalformedNetConfig {
                    document: "interfaces",
                    source: Arc::new(source),
                }
            })?;
        let port_records =
            Option::<Vec<PortRecord>>::deserialize(&mut deserializer).map_err(|source| {
                LabError::MalformedNetConfig {
                    document: "exposed ports",
                    source: Arc::new(source),
                }
            })?;

        let mut interfaces = HashMap::new();
        for record in interface_records.unwrap_or_default() {
            let address = record
                .address
                .parse::<IpAddr>()
                .map_err(|_| LabError::InvalidAddress {
                    interface: record.ifname.clone(),
                    address: record.address.clone(),
                })?;
            interfaces.insert(record.ifname, address);
        }
        let exposed_ports = port_records
            .unwrap_or_default()
            .into_iter()
            .map(|record| (record.internal, record.external))
            .collect();

        Ok(Self {
            interfaces,
            exposed_ports,
        })
    }

    /// Interface addresses keyed by interface name.
    #[must_use]
    pub const fn interfaces(&self) -> &HashMap<String, IpAddr> {
        &self.interfaces
    }

    /// External ports keyed by internal port.
    #[must_use]
    pub const fn exposed_ports(&self) -> &HashMap<u16, u16> {
        &self.exposed_ports
    }

    /// The lab's main address: `eth0` when present, otherwise any interface.
    #[must_use]
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.interfaces
            .get(PRIMARY_INTERFACE)
            .or_else(|| self.interfaces.values().next())
            .copied()
    }

    /// Address and port a test should use to reach `port` inside the lab.
    ///
    /// Routed labs are reached directly on their primary address. Forwarded
    /// labs, and routed labs without any address, are reached on the
    /// loopback address through the mapped external port.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::RouteNotFound`] when neither route is available.
    pub fn access_point(&self, port: u16, mode: AddressingMode) -> Result<SocketAddr, LabError> {
        if !mode.needs_forwarding()
            && let Some(address) = self.primary_address()
        {
            return Ok(SocketAddr::new(address, port));
        }
        self.exposed_ports
            .get(&port)
            .map(|external| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), *external))
            .ok_or(LabError::RouteNotFound { port })
    }
}

#[cfg(test)]
mod tests;
