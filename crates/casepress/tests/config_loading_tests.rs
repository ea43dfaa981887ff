//! Table-driven tests for configuration loading and validation.

mod common;

use std::time::Duration;

use serial_test::serial;

use casepress::config::{load_config, load_config_from_str, LeakPolicy, LogFormat};
use casepress::telemetry::{env_filter, LOG_ENV};
use casepress::ConfigError;

use common::TestHarness;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "database_path": "/tmp/casepress-test.db",
            "scheduler": { "poll_interval_secs": 2, "max_concurrent": 8 },
            "chunking": { "max_chunk_size": 12000 },
            "generation": { "max_attempts": 5, "call_timeout_secs": 30, "api_key_env": "MY_KEY" },
            "quality": {
                "thresholds": { "structure": 60, "discoverability": 65, "readability": 70, "trust": 75 },
                "weights": { "structure": 0.25, "discoverability": 0.25, "readability": 0.25, "trust": 0.25 }
            },
            "postprocess": {
                "title_max_length": 60,
                "meta_description_max_length": 150,
                "links": { "max_internal": 2, "internal": [ { "term": "ביטוח", "path": "/insurance" } ] }
            },
            "privacy": { "leak_policy": "discard_draft" },
            "logging": { "level": "debug", "format": "json" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "wrong_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "zero_poll_interval",
        config_json: r#"{ "version": "1.0", "scheduler": { "poll_interval_secs": 0 } }"#,
        should_succeed: false,
        expected_error: Some("poll_interval_secs"),
    },
    ConfigTestCase {
        name: "zero_concurrency",
        config_json: r#"{ "version": "1.0", "scheduler": { "max_concurrent": 0 } }"#,
        should_succeed: false,
        expected_error: Some("max_concurrent"),
    },
    ConfigTestCase {
        name: "zero_attempts",
        config_json: r#"{ "version": "1.0", "generation": { "max_attempts": 0 } }"#,
        should_succeed: false,
        expected_error: Some("max_attempts"),
    },
    ConfigTestCase {
        name: "threshold_above_100",
        config_json: r#"{ "version": "1.0", "quality": { "thresholds": { "structure": 101, "discoverability": 70, "readability": 70, "trust": 70 } } }"#,
        should_succeed: false,
        expected_error: Some("exceeds 100"),
    },
    ConfigTestCase {
        name: "weights_not_summing_to_one",
        config_json: r#"{ "version": "1.0", "quality": { "weights": { "structure": 0.5, "discoverability": 0.5, "readability": 0.5, "trust": 0.5 } } }"#,
        should_succeed: false,
        expected_error: Some("must sum to 1.0"),
    },
    ConfigTestCase {
        name: "unknown_leak_policy",
        config_json: r#"{ "version": "1.0", "privacy": { "leak_policy": "publish_anyway" } }"#,
        should_succeed: false,
        expected_error: Some("parse config JSON"),
    },
    ConfigTestCase {
        name: "invalid_external_link_pattern",
        config_json: r#"{ "version": "1.0", "postprocess": { "links": { "external": [ { "pattern": "(", "url": "https://example.org", "title": "x" } ] } } }"#,
        should_succeed: false,
        expected_error: Some("postprocess.links.external"),
    },
    ConfigTestCase {
        name: "empty_internal_link_term",
        config_json: r#"{ "version": "1.0", "postprocess": { "links": { "internal": [ { "term": " ", "path": "/x" } ] } } }"#,
        should_succeed: false,
        expected_error: Some("empty term"),
    },
    ConfigTestCase {
        name: "not_json",
        config_json: "version = 1.0",
        should_succeed: false,
        expected_error: Some("parse config JSON"),
    },
];

#[test]
fn test_config_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("{}: expected success, got {}", case.name, e),
            (false, Ok(_)) => panic!("{}: expected failure", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "{}: error '{}' does not contain '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_full_config_values() {
    let case = CONFIG_TESTS.iter().find(|c| c.name == "valid_full").unwrap();
    let config = load_config_from_str(case.config_json).unwrap();

    assert_eq!(config.scheduler.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.scheduler.max_concurrent, 8);
    assert_eq!(config.chunking.max_chunk_size, 12_000);
    assert_eq!(config.generation.call_timeout(), Duration::from_secs(30));
    assert_eq!(config.quality.thresholds.trust, 75);
    assert_eq!(config.privacy.leak_policy, LeakPolicy::DiscardDraft);
    assert_eq!(config.postprocess.links.max_internal, 2);
    assert_eq!(config.postprocess.links.max_external, 3);
    assert_eq!(config.postprocess.links.internal.len(), 1);
    assert!(config.postprocess.links.enabled);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(
        config.database_path().unwrap().to_str(),
        Some("/tmp/casepress-test.db")
    );
}

#[test]
fn test_missing_file_reports_path() {
    let harness = TestHarness::new();
    let path = harness.db_path().with_file_name("missing.json");
    match load_config(&path) {
        Err(ConfigError::ReadFile { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected read error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_config_file_round_trip_through_disk() {
    let harness = TestHarness::new();
    let path = harness.db_path().with_file_name("casepress.json");
    std::fs::write(&path, r#"{ "version": "1.0", "scheduler": { "max_concurrent": 4 } }"#).unwrap();
    assert_eq!(load_config(&path).unwrap().scheduler.max_concurrent, 4);
}

#[test]
#[serial]
fn test_log_env_overrides_configured_level() {
    let config = load_config_from_str(r#"{ "version": "1.0", "logging": { "level": "warn" } }"#).unwrap();

    std::env::remove_var(LOG_ENV);
    assert_eq!(env_filter(&config.logging).to_string(), "warn");

    std::env::set_var(LOG_ENV, "casepress=trace");
    assert_eq!(env_filter(&config.logging).to_string(), "casepress=trace");
    std::env::remove_var(LOG_ENV);
}
