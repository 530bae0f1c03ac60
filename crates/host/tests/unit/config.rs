//! # Configuration Tests
//!
//! Defaults, JSON overrides, and backend selection parsing.

use std::time::Duration;

use dbgnoc_host::{BackendKind, BackendOption, Error, SessionConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_session_config_defaults() {
    let config = SessionConfig::default();
    assert_eq!(config.request_timeout(), Duration::from_secs(1));
    assert_eq!(config.probe_timeout(), Duration::from_millis(100));
    assert_eq!(config.max_modules, 1024);
    assert_eq!(config.gap_probe_window, 2);
    assert_eq!(config.poll_interval(), Duration::from_micros(200));
    assert_eq!(config.reassembly_timeout(), Duration::from_secs(1));
    assert_eq!(config.log_priority, None);
}

#[test]
fn test_empty_json_gives_defaults() {
    assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
}

#[test]
fn test_json_overrides_subset() {
    let config =
        SessionConfig::from_json(r#"{ "probe_timeout_ms": 5, "max_modules": 64, "log_priority": 7 }"#)
            .unwrap();
    assert_eq!(config.probe_timeout_ms, 5);
    assert_eq!(config.max_modules, 64);
    assert_eq!(config.log_priority, Some(7));
    assert_eq!(config.request_timeout_ms, 1000);
}

#[rstest]
#[case::unknown_field(r#"{ "retries": 3 }"#)]
#[case::wrong_type(r#"{ "max_modules": "many" }"#)]
#[case::not_json("timeout=5")]
fn test_bad_json_is_invalid_argument(#[case] json: &str) {
    assert!(matches!(SessionConfig::from_json(json), Err(Error::InvalidArgument(_))));
}

#[rstest]
#[case("dbgnoc", BackendKind::DbgNoc)]
#[case("simtcp", BackendKind::SimTcp)]
#[case("SimTcp", BackendKind::SimTcp)]
fn test_backend_kind_from_str(#[case] text: &str, #[case] kind: BackendKind) {
    assert_eq!(text.parse::<BackendKind>().unwrap(), kind);
    assert_eq!(kind.to_string(), text.to_ascii_lowercase());
}

#[test]
fn test_unknown_backend_kind() {
    assert!(matches!("usb".parse::<BackendKind>(), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_backend_selection_deserializes() {
    let kind: BackendKind = serde_json::from_str(r#""dbgnoc""#).unwrap();
    assert_eq!(kind, BackendKind::DbgNoc);

    let options: Vec<BackendOption> =
        serde_json::from_str(r#"[{ "name": "host", "value": "sim.local" }]"#).unwrap();
    assert_eq!(options, vec![BackendOption::new("host", "sim.local")]);
}
