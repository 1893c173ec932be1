//! Config loading, TOML parsing, and env var override tests.
//!
//! Some tests are `#[ignore]` (they chdir or set env vars and conflict in
//! parallel). Run them with:
//! `cargo test --test config_tests -- --ignored --test-threads=1`

use engine_adapter::config::{EventConfig, LoggingConfig};
use engine_adapter::{AdapterConfig, CapabilitiesConfig, Credentials};
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, String) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("adapter.toml");
    fs::write(&path, contents).unwrap();
    let path = path.to_string_lossy().into_owned();
    (temp, path)
}

// Default Configuration Tests
#[test]
fn test_config_default_connection() {
    let config = AdapterConfig::default();
    assert!(!config.connection.strict);
    assert_eq!(config.connection.capacity, 0);
    assert!(config.connection.notifications);
    assert!(config.connection.user.is_none());
    assert!(config.connection.capabilities.is_none());
}

#[test]
fn test_config_default_events() {
    assert_eq!(AdapterConfig::default().events, EventConfig { status_capacity: 64 });
}

// TOML File Parsing Tests
#[test]
fn test_from_file_full() {
    let (_temp, path) = write_config(
        r#"
[connection]
strict = true
capacity = 128
notifications = false
query_timeout_secs = 30

[connection.user]
username = "root"
password = "root"

[connection.capabilities]
scripting = false
live_query_notifications = true
network_targets = { allow = true, deny = ["10.0.0.1"] }

[logging]
level = "engine_adapter=debug"
format = "json"
file = "/tmp/adapter.log"

[events]
status_capacity = 8
"#,
    );

    let config = AdapterConfig::from_file(&path).unwrap();
    assert!(config.connection.strict);
    assert_eq!(config.connection.capacity, 128);
    assert!(!config.connection.notifications);
    assert_eq!(config.connection.query_timeout_secs, Some(30));
    assert_eq!(config.connection.transaction_timeout_secs, None);
    assert!(matches!(
        config.connection.user,
        Some(Credentials::Root { ref username, .. }) if username == "root"
    ));
    let capabilities = config.connection.capabilities.unwrap();
    assert!(capabilities.allows_live_queries());
    assert!(matches!(capabilities, CapabilitiesConfig::Detailed { scripting: Some(false), .. }));
    assert_eq!(
        config.logging,
        LoggingConfig {
            level: "engine_adapter=debug".to_string(),
            format: "json".to_string(),
            file: Some("/tmp/adapter.log".to_string()),
        }
    );
    assert_eq!(config.events.status_capacity, 8);
}

#[test]
fn test_from_file_partial_keeps_defaults() {
    let (_temp, path) = write_config("[connection]\ncapacity = 4\n");
    let config = AdapterConfig::from_file(&path).unwrap();
    assert_eq!(config.connection.capacity, 4);
    assert!(config.connection.notifications);
    assert_eq!(config.logging, LoggingConfig::default());
    assert_eq!(config.events, EventConfig::default());
}

#[test]
fn test_from_missing_file_is_default() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.toml");
    let config = AdapterConfig::from_file(&path.to_string_lossy()).unwrap();
    assert_eq!(config, AdapterConfig::default());
}

#[test]
fn test_from_file_rejects_wrong_types() {
    let (_temp, path) = write_config("[connection]\nstrict = \"very\"\n");
    assert!(AdapterConfig::from_file(&path).is_err());
}

#[test]
fn test_capabilities_boolean_form() {
    let (_temp, path) = write_config("[connection]\ncapabilities = false\n");
    let config = AdapterConfig::from_file(&path).unwrap();
    assert_eq!(
        config.connection.capabilities,
        Some(CapabilitiesConfig::Bool(false))
    );
}

// Layered Loading Tests
#[test]
#[ignore = "Requires --test-threads=1 due to directory change"]
fn test_load_merges_local_overrides() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("adapter.toml"),
        "[connection]\nstrict = true\ncapacity = 10\n",
    )
    .unwrap();
    fs::write(
        temp.path().join("adapter.local.toml"),
        "[connection]\ncapacity = 20\n",
    )
    .unwrap();

    let original_dir = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let config = AdapterConfig::load();
    env::set_current_dir(original_dir).unwrap();

    let config = config.unwrap();
    assert!(config.connection.strict);
    assert_eq!(config.connection.capacity, 20);
}

#[test]
#[ignore = "Requires --test-threads=1 due to env var changes"]
fn test_env_overrides_file() {
    let (_temp, path) = write_config("[logging]\nlevel = \"info\"\n");

    env::set_var("ENGINE_ADAPTER_LOGGING__LEVEL", "trace");
    env::set_var("ENGINE_ADAPTER_CONNECTION__STRICT", "true");
    let config = AdapterConfig::from_file(&path);
    env::remove_var("ENGINE_ADAPTER_LOGGING__LEVEL");
    env::remove_var("ENGINE_ADAPTER_CONNECTION__STRICT");

    let config = config.unwrap();
    assert_eq!(config.logging.level, "trace");
    assert!(config.connection.strict);
}
