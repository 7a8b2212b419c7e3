//! Unit Tests for Pure Functions
//!
//! DNS resolver validation, connectivity derivation and configuration parsing. None of these
//! touch threads, engines or interfaces.

use meshtun_core::{
    classify_dns_entry, derive_connectivity, dns::parse_dns_servers_detailed, parse_dns_servers,
    ConnectivityState, DnsRejection, TunnelConfig,
};
use std::net::IpAddr;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn addrs(raw: &str) -> Vec<IpAddr> {
    parse_dns_servers(raw).iter().map(|e| e.addr()).collect()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

// ----------------------------------------------------------------------------
// DNS Validator Tests
// ----------------------------------------------------------------------------

#[test]
fn test_mixed_list_keeps_only_bare_addresses_in_order() {
    let parsed = addrs("1.2.3.4, 8.8.8.8:53, [2001:db8::1]:80, bad, 2001:db8::2");
    assert_eq!(parsed, vec![ip("1.2.3.4"), ip("2001:db8::2")]);
}

#[test]
fn test_entries_are_trimmed() {
    let parsed = addrs("   9.9.9.9\t,\n149.112.112.112  ");
    assert_eq!(parsed, vec![ip("9.9.9.9"), ip("149.112.112.112")]);
}

#[test]
fn test_bracketed_ipv6_kept_without_brackets() {
    let parsed = addrs("[2606:4700:4700::1111], 1.1.1.1");
    assert_eq!(parsed, vec![ip("2606:4700:4700::1111"), ip("1.1.1.1")]);
}

#[test]
fn test_rejection_reasons_are_reported() {
    let detailed = parse_dns_servers_detailed("8.8.8.8:53, nope, 8.8.4.4");
    let reasons: Vec<_> = detailed.iter().map(|(_, r)| r.as_ref().err().copied()).collect();

    assert_eq!(
        reasons,
        vec![
            Some(DnsRejection::EmbeddedPort),
            Some(DnsRejection::Malformed),
            None
        ]
    );
}

#[test]
fn test_ipv4_with_non_numeric_suffix_is_malformed() {
    assert_eq!(
        classify_dns_entry("8.8.8.8:dns"),
        Err(DnsRejection::Malformed)
    );
}

#[test]
fn test_bare_ipv6_is_not_mistaken_for_port() {
    assert!(classify_dns_entry("::1").is_ok());
    assert!(classify_dns_entry("fd00::53").is_ok());
}

// ----------------------------------------------------------------------------
// Connectivity Derivation Tests
// ----------------------------------------------------------------------------

#[test]
fn test_no_routes_and_null_tree_is_enabled() {
    assert_eq!(derive_connectivity(0, None), ConnectivityState::Enabled);
    assert_eq!(derive_connectivity(0, Some("null")), ConnectivityState::Enabled);
}

#[test]
fn test_two_tree_entries_is_connected() {
    let tree = r#"[{"key":"a"},{"key":"b"}]"#;
    assert_eq!(derive_connectivity(0, Some(tree)), ConnectivityState::Connected);
}

#[test]
fn test_routing_entries_alone_connect() {
    assert_eq!(derive_connectivity(1, Some("[]")), ConnectivityState::Connected);
}

#[test]
fn test_single_tree_entry_is_only_enabled() {
    // The node always sees itself in the tree
    assert_eq!(
        derive_connectivity(0, Some(r#"[{"key":"self"}]"#)),
        ConnectivityState::Enabled
    );
}

#[test]
fn test_garbage_tree_report_does_not_connect() {
    assert_eq!(
        derive_connectivity(0, Some("not json")),
        ConnectivityState::Enabled
    );
}

// ----------------------------------------------------------------------------
// Configuration Tests
// ----------------------------------------------------------------------------

#[test]
fn test_config_from_toml_with_defaults() {
    let raw = r#"
        enabled = true
        dns_servers = "1.1.1.1, [2606:4700:4700::1111]"

        [timing]
        poll_interval_ms = 2000
        state_interval_ms = 20000

        [engine]
        Peers = ["tcp://198.51.100.7:9001"]
        IfMTU = 65535
    "#;

    let config: TunnelConfig = toml::from_str(raw).unwrap();
    assert!(config.enabled);
    assert_eq!(config.session_name, "meshtun");
    assert_eq!(config.timing.initial_delay_ms, 500);
    assert_eq!(config.timing.poll_interval_ms, 2000);
    assert_eq!(config.engine["IfMTU"], 65535);
    assert!(config.validate().is_ok());
    assert_eq!(parse_dns_servers(&config.dns_servers).len(), 2);
}
