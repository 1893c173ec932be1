//! Connection state owned by one adapter instance.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::engine::Engine;
use crate::protocol::{Method, SideEffect};

/// Lifecycle status of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable connection state.
///
/// `engine` is `Some` exactly while a connect has completed and no disconnect
/// has completed since. `token` is `None` whenever `status` is
/// `Disconnected`.
#[derive(Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub endpoint: Option<String>,
    pub namespace: Option<String>,
    pub database: Option<String>,
    pub token: Option<String>,
    pub(crate) engine: Option<Arc<dyn Engine>>,
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("status", &self.status)
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("engine", &self.engine.is_some())
            .finish()
    }
}

impl ConnectionState {
    /// Apply the side effect of a call that returned `result` successfully.
    pub fn apply(&mut self, method: &Method, params: &[Value], result: &Value) {
        match method.side_effect() {
            SideEffect::SelectNamespaceDatabase => {
                assign_scope(&mut self.namespace, params.first(), "namespace");
                assign_scope(&mut self.database, params.get(1), "database");
            }
            SideEffect::TokenFromResult => {
                self.token = result.as_str().map(str::to_string);
            }
            SideEffect::TokenFromParams => {
                if let Some(token) = params.first().and_then(Value::as_str) {
                    self.token = Some(token.to_string());
                }
            }
            SideEffect::ClearToken => self.token = None,
            SideEffect::None => {}
        }
    }

    /// Forget everything bound to the current session.
    pub fn clear_session(&mut self) {
        self.endpoint = None;
        self.namespace = None;
        self.database = None;
        self.token = None;
    }
}

/// A string sets the field; null or absent keeps it.
fn assign_scope(field: &mut Option<String>, param: Option<&Value>, what: &str) {
    match param {
        Some(Value::String(value)) => *field = Some(value.clone()),
        None | Some(Value::Null) => {}
        Some(other) => {
            warn!(field = what, value = %other, "use_param_ignored");
        }
    }
}
