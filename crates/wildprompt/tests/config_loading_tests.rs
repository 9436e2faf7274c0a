//! Table-driven tests for configuration loading and validation.

use wildprompt::config::{load_config, load_config_from_str};
use wildprompt::error::ConfigError;

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

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "wildcards"
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "/srv/wildcards",
            "settings": {
                "auto_fit_resolution": true,
                "wildcard_standalone": false,
                "sampler": "euler"
            },
            "expansion": { "max_depth": 20, "seed": 7 },
            "script": { "max_steps": 5000, "max_output_bytes": 1024 }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "max_depth_at_limit",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "wildcards",
            "expansion": { "max_depth": 64 }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{
            "version": "2.0",
            "wildcard_directory": "wildcards"
        }"#,
        should_succeed: false,
        expected_error: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "wildcard_directory": "wildcards" }"#,
        should_succeed: false,
        expected_error: Some("version"),
    },
    ConfigTestCase {
        name: "blank_wildcard_directory",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "   "
        }"#,
        should_succeed: false,
        expected_error: Some("wildcard_directory must not be empty"),
    },
    ConfigTestCase {
        name: "zero_max_depth",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "wildcards",
            "expansion": { "max_depth": 0 }
        }"#,
        should_succeed: false,
        expected_error: Some("expansion.max_depth"),
    },
    ConfigTestCase {
        name: "max_depth_over_limit",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "wildcards",
            "expansion": { "max_depth": 65 }
        }"#,
        should_succeed: false,
        expected_error: Some("got 65"),
    },
    ConfigTestCase {
        name: "zero_max_steps",
        config_json: r#"{
            "version": "1.0",
            "wildcard_directory": "wildcards",
            "script": { "max_steps": 0 }
        }"#,
        should_succeed: false,
        expected_error: Some("script.max_steps"),
    },
    ConfigTestCase {
        name: "malformed_json",
        config_json: r#"{ "version": "1.0", "wildcard_directory": }"#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);

        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("[{}] expected success, got error: {}", case.name, e),
            (false, Ok(_)) => panic!("[{}] expected an error, config loaded", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    let message = e.to_string();
                    assert!(
                        message.contains(expected),
                        "[{}] error '{}' should contain '{}'",
                        case.name,
                        message,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_full_config_values() {
    let config = load_config_from_str(JSON_CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(config.wildcard_directory, "/srv/wildcards");
    assert!(config.settings.auto_fit_resolution);
    assert_eq!(
        config.settings.extra.get("sampler"),
        Some(&serde_json::json!("euler"))
    );
    assert_eq!(config.expansion.max_depth, 20);
    assert_eq!(config.expansion.seed, Some(7));
    assert_eq!(config.script.max_steps, 5000);
    assert_eq!(config.script.max_output_bytes, 1024);
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, JSON_CONFIG_TESTS[0].config_json).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.wildcard_directory, "wildcards");
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    match load_config(&path) {
        Err(ConfigError::ReadFile { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected ReadFile error, got {:?}", other.map(|_| ())),
    }
}
