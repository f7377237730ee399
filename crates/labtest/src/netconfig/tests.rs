//! Tests for network configuration parsing and address resolution.

use std::net::Ipv6Addr;

use rstest::{fixture, rstest};

use super::*;

const INSPECTION: &str = concat!(
    r#"[{"address":"10.1.0.7","ifname":"eth0"},{"address":"192.168.9.2","ifname":"eth1"}]"#,
    " ",
    r#"[{"internal":5432,"external":55000},{"internal":8080,"external":32768}]"#,
    "\n",
);

fn address(text: &str) -> IpAddr {
    text.parse().expect("valid address literal")
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[fixture]
fn mapped_only() -> NetConfig {
    NetConfig::new(HashMap::new(), HashMap::from([(5432, 55000)]))
}

#[fixture]
fn routed_lab() -> NetConfig {
    NetConfig::new(
        HashMap::from([(String::from("eth0"), address("10.1.0.7"))]),
        HashMap::from([(5432, 55000)]),
    )
}

#[test]
fn parses_both_documents() {
    let config = NetConfig::parse(INSPECTION.as_bytes()).expect("valid inspection output");
    assert_eq!(config.interfaces().len(), 2);
    assert_eq!(
        config.interfaces().get("eth1").copied(),
        Some(address("192.168.9.2"))
    );
    assert_eq!(config.exposed_ports().get(&5432), Some(&55000));
    assert_eq!(config.exposed_ports().get(&8080), Some(&32768));
}

#[rstest]
#[case::newline_separated("[]\n[]")]
#[case::adjacent("[][]")]
#[case::null_documents("null null")]
fn accepts_empty_documents(#[case] output: &str) {
    let config = NetConfig::parse(output.as_bytes()).expect("empty documents parse");
    assert_eq!(config, NetConfig::default());
}

#[test]
fn accepts_ipv6_addresses() {
    let config = NetConfig::parse(br#"[{"address":"fd00::5","ifname":"eth0"}] []"#)
        .expect("ipv6 address parses");
    assert_eq!(
        config.primary_address(),
        Some(IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 5)))
    );
}

#[rstest]
#[case::truncated_interfaces(r#"[{"address":"10.0.0.1""#, "interfaces")]
#[case::missing_ports(r#"[{"address":"10.0.0.1","ifname":"eth0"}]"#, "exposed ports")]
#[case::wrong_port_type(r#"[] [{"internal":"x","external":1}]"#, "exposed ports")]
#[case::tool_error_text("Error: no such lab", "interfaces")]
fn rejects_malformed_json(#[case] output: &str, #[case] expected_document: &str) {
    let error = NetConfig::parse(output.as_bytes()).expect_err("malformed output");
    match error {
        LabError::MalformedNetConfig { document, .. } => assert_eq!(document, expected_document),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejects_invalid_address_naming_interface() {
    let error = NetConfig::parse(br#"[{"address":"not-an-ip","ifname":"eth3"}] []"#)
        .expect_err("invalid address");
    assert_eq!(error.to_string(), "error parsing address (not-an-ip) of eth3");
}

#[test]
fn primary_address_prefers_eth0() {
    let config = NetConfig::new(
        HashMap::from([
            (String::from("eth1"), address("192.168.9.2")),
            (String::from("eth0"), address("10.1.0.7")),
            (String::from("eth2"), address("172.16.0.3")),
        ]),
        HashMap::new(),
    );
    assert_eq!(config.primary_address(), Some(address("10.1.0.7")));
}

#[test]
fn primary_address_falls_back_to_any_interface() {
    let config = NetConfig::new(
        HashMap::from([(String::from("ens4"), address("172.16.0.3"))]),
        HashMap::new(),
    );
    assert_eq!(config.primary_address(), Some(address("172.16.0.3")));
    assert_eq!(NetConfig::default().primary_address(), None);
}

#[rstest]
fn routed_mode_uses_primary_address_and_internal_port(routed_lab: NetConfig) {
    let endpoint = routed_lab
        .access_point(5432, AddressingMode::Routed)
        .expect("routed endpoint");
    assert_eq!(endpoint, SocketAddr::new(address("10.1.0.7"), 5432));
}

#[rstest]
fn routed_mode_keeps_port_even_when_unmapped(routed_lab: NetConfig) {
    let endpoint = routed_lab
        .access_point(9000, AddressingMode::Routed)
        .expect("routed endpoint");
    assert_eq!(endpoint.port(), 9000);
}

#[rstest]
fn forwarded_mode_uses_loopback_and_mapped_port(routed_lab: NetConfig) {
    let endpoint = routed_lab
        .access_point(5432, AddressingMode::Forwarded)
        .expect("forwarded endpoint");
    assert_eq!(endpoint, loopback(55000));
}

#[rstest]
fn routed_mode_without_address_falls_back_to_mapping(mapped_only: NetConfig) {
    let endpoint = mapped_only
        .access_point(5432, AddressingMode::Routed)
        .expect("fallback endpoint");
    assert_eq!(endpoint, loopback(55000));
}

#[rstest]
#[case(AddressingMode::Routed)]
#[case(AddressingMode::Forwarded)]
fn unmapped_port_without_route_is_an_error(mapped_only: NetConfig, #[case] mode: AddressingMode) {
    let error = mapped_only
        .access_point(6379, mode)
        .expect_err("no route to 6379");
    assert!(matches!(error, LabError::RouteNotFound { port: 6379 }));
    assert_eq!(error.to_string(), "could not find port mapping for 6379");
}
