//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - adapter.toml (default configuration)
//! - adapter.local.toml (git-ignored local overrides)
//! - Environment variables (ENGINE_ADAPTER_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # adapter.toml
//! [connection]
//! strict = true
//! capacity = 256
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! ENGINE_ADAPTER_CONNECTION__STRICT=true
//! ENGINE_ADAPTER_LOGGING__LEVEL=trace
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default)]
    pub connection: ConnectionOptions,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub events: EventConfig,
}

/// Options handed to the engine collaborator when it is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Require a selected namespace and database before record operations
    #[serde(default)]
    pub strict: bool,

    /// Capacity of the engine's notification channel (0 = unbounded)
    #[serde(default)]
    pub capacity: usize,

    /// Enable the live notification stream
    #[serde(default = "default_true")]
    pub notifications: bool,

    /// Per-query timeout in seconds, enforced by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_secs: Option<u64>,

    /// Per-transaction timeout in seconds, enforced by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_timeout_secs: Option<u64>,

    /// Credentials the engine signs in with on construction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Credentials>,

    /// Capability restrictions for the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitiesConfig>,
}

impl ConnectionOptions {
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }

    pub fn user(mut self, user: Credentials) -> Self {
        self.user = Some(user);
        self
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            strict: false,
            capacity: 0,
            notifications: true,
            query_timeout_secs: None,
            transaction_timeout_secs: None,
            user: None,
            capabilities: None,
        }
    }
}

/// Sign-in credentials, most specific first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    Scope {
        namespace: String,
        database: String,
        scope: String,
        #[serde(flatten)]
        params: serde_json::Map<String, serde_json::Value>,
    },
    Database {
        namespace: String,
        database: String,
        username: String,
        password: String,
    },
    Namespace {
        namespace: String,
        username: String,
        password: String,
    },
    Root {
        username: String,
        password: String,
    },
}

/// Engine capabilities: either all/none, or a detailed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilitiesConfig {
    Bool(bool),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scripting: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guest_access: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        live_query_notifications: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        functions: Option<Targets>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network_targets: Option<Targets>,
    },
}

impl CapabilitiesConfig {
    /// Whether live query notifications are allowed by these capabilities.
    pub fn allows_live_queries(&self) -> bool {
        match self {
            CapabilitiesConfig::Bool(all) => *all,
            CapabilitiesConfig::Detailed {
                live_query_notifications,
                ..
            } => live_query_notifications.unwrap_or(true),
        }
    }
}

/// Target list for a capability (functions, network targets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    Bool(bool),
    List(BTreeSet<String>),
    AllowDeny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow: Option<TargetsConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deny: Option<TargetsConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetsConfig {
    Bool(bool),
    List(BTreeSet<String>),
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Write logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Event surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Buffered status events per subscriber before it starts lagging
    #[serde(default = "default_status_capacity")]
    pub status_capacity: usize,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_status_capacity() -> usize {
    64
}

impl AdapterConfig {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. adapter.toml (base configuration)
    /// 2. adapter.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (ENGINE_ADAPTER_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("adapter.toml"))
            .merge(Toml::file("adapter.local.toml"))
            .merge(Env::prefixed("ENGINE_ADAPTER_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENGINE_ADAPTER_").split("__"))
            .extract()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        EventConfig {
            status_capacity: default_status_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert!(!config.connection.strict);
        assert_eq!(config.connection.capacity, 0);
        assert!(config.connection.notifications);
        assert_eq!(config.events.status_capacity, 64);
    }

    #[test]
    fn test_config_serialization() {
        let config = AdapterConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("[events]"));
    }

    #[test]
    fn test_default_logging_config() {
        let config = AdapterConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = AdapterConfig::default();
        config.connection = config.connection.strict(true).capacity(16);
        let toml_str = toml::to_string(&config).unwrap();
        let back: AdapterConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_empty_sections_fill_defaults() {
        let config: AdapterConfig = toml::from_str("[connection]\nstrict = true\n").unwrap();
        assert!(config.connection.strict);
        assert!(config.connection.notifications);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_credentials_untagged_root() {
        let creds: Credentials =
            serde_json::from_str(r#"{"username": "root", "password": "root"}"#).unwrap();
        assert!(matches!(creds, Credentials::Root { .. }));
    }

    #[test]
    fn test_credentials_untagged_database() {
        let creds: Credentials = serde_json::from_str(
            r#"{"namespace": "ns", "database": "db", "username": "u", "password": "p"}"#,
        )
        .unwrap();
        assert!(matches!(creds, Credentials::Database { .. }));
    }

    #[test]
    fn test_credentials_untagged_scope_keeps_params() {
        let creds: Credentials = serde_json::from_str(
            r#"{"namespace": "ns", "database": "db", "scope": "user", "email": "a@b.c"}"#,
        )
        .unwrap();
        match creds {
            Credentials::Scope { params, .. } => {
                assert_eq!(params.get("email").and_then(|v| v.as_str()), Some("a@b.c"));
            }
            other => panic!("expected scope credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_capabilities_bool_and_detailed() {
        let all: CapabilitiesConfig = serde_json::from_str("true").unwrap();
        assert!(all.allows_live_queries());

        let detailed: CapabilitiesConfig = serde_json::from_str(
            r#"{"live_query_notifications": false, "functions": ["string::len"]}"#,
        )
        .unwrap();
        assert!(!detailed.allows_live_queries());
        match detailed {
            CapabilitiesConfig::Detailed {
                functions: Some(Targets::List(set)),
                ..
            } => assert!(set.contains("string::len")),
            other => panic!("unexpected capabilities: {other:?}"),
        }
    }

    #[test]
    fn test_targets_allow_deny() {
        let targets: Targets =
            serde_json::from_str(r#"{"allow": true, "deny": ["http::get"]}"#).unwrap();
        assert!(matches!(
            targets,
            Targets::AllowDeny {
                allow: Some(TargetsConfig::Bool(true)),
                deny: Some(TargetsConfig::List(_)),
            }
        ));
    }
}
