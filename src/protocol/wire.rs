//! Wire Format Types
//!
//! Structured values exchanged with the embedded engine. These are the shapes
//! on either side of the codec boundary: what the adapter encodes into a
//! request blob, what a response blob decodes into, and what one item of the
//! notification stream carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::method::Method;

/// Error code attached to every RPC-level failure produced by the adapter.
pub const INTERNAL_ERROR_CODE: i64 = -1;

// ============================================================================
// Requests
// ============================================================================

/// One logical call as issued by the application: a method and its params.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: Method,
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Create a request for any method name.
    pub fn new(method: impl Into<Method>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Create a request that carries no params.
    pub fn bare(method: impl Into<Method>) -> Self {
        Self::new(method, Vec::new())
    }

    /// Attach a request identifier, producing the value that crosses the codec.
    pub fn into_call(self, id: u64) -> PendingCall {
        PendingCall {
            id,
            method: self.method,
            params: self.params,
        }
    }

    /// String param at `index`, if present and a string.
    pub fn str_param(&self, index: usize) -> Option<&str> {
        self.params.get(index).and_then(Value::as_str)
    }
}

/// A request in flight: the encoded unit `{id, method, params}`.
///
/// Lives only for the duration of one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: u64,
    pub method: Method,
    pub params: Vec<Value>,
}

// ============================================================================
// Responses
// ============================================================================

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Error with the fixed internal code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR_CODE,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Outcome of one RPC. Serializes as `{"result": ...}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResponse {
    Result(Value),
    Error(RpcError),
}

impl RpcResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, RpcResponse::Result(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, RpcResponse::Error(_))
    }

    /// Borrow the decoded result, if the call succeeded.
    pub fn result(&self) -> Option<&Value> {
        match self {
            RpcResponse::Result(v) => Some(v),
            RpcResponse::Error(_) => None,
        }
    }

    /// Borrow the error payload, if the call failed.
    pub fn error(&self) -> Option<&RpcError> {
        match self {
            RpcResponse::Result(_) => None,
            RpcResponse::Error(e) => Some(e),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self {
            RpcResponse::Result(v) => Ok(v),
            RpcResponse::Error(e) => Err(e),
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Kind of change reported by a live notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiveAction {
    Create,
    Update,
    Delete,
    /// The live query was killed on the engine side
    Killed,
    Other(String),
}

impl LiveAction {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE" => LiveAction::Create,
            "UPDATE" => LiveAction::Update,
            "DELETE" => LiveAction::Delete,
            "KILLED" => LiveAction::Killed,
            other => LiveAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LiveAction::Create => "CREATE",
            LiveAction::Update => "UPDATE",
            LiveAction::Delete => "DELETE",
            LiveAction::Killed => "KILLED",
            LiveAction::Other(s) => s,
        }
    }
}

impl Serialize for LiveAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LiveAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(LiveAction::parse(&raw))
    }
}

impl std::fmt::Display for LiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded item of the engine's notification stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Subscription (live query) identifier; items without one are not relayed
    pub id: Option<String>,
    pub action: Option<LiveAction>,
    pub result: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_response_result_serialize() {
        let res = RpcResponse::Result(json!({"id": "person:1"}));
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json, json!({"result": {"id": "person:1"}}));
    }

    #[test]
    fn test_rpc_response_error_serialize() {
        let res = RpcResponse::Error(RpcError::internal("boom"));
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json, json!({"error": {"code": -1, "message": "boom"}}));
    }

    #[test]
    fn test_rpc_response_accessors() {
        let ok = RpcResponse::Result(json!(1));
        assert!(ok.is_ok());
        assert_eq!(ok.result(), Some(&json!(1)));
        assert!(ok.error().is_none());

        let err = RpcResponse::Error(RpcError::internal("x"));
        assert!(err.is_err());
        assert_eq!(err.error().map(|e| e.code), Some(INTERNAL_ERROR_CODE));
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_request_into_call_keeps_method_and_params() {
        let req = RpcRequest::new("use", vec![json!("ns"), json!("db")]);
        assert_eq!(req.str_param(0), Some("ns"));
        assert_eq!(req.str_param(2), None);
        let call = req.into_call(7);
        assert_eq!(call.id, 7);
        assert_eq!(call.method, Method::Use);
        assert_eq!(call.params.len(), 2);
    }

    #[test]
    fn test_live_action_parse() {
        assert_eq!(LiveAction::parse("CREATE"), LiveAction::Create);
        assert_eq!(LiveAction::parse("KILLED"), LiveAction::Killed);
        assert_eq!(
            LiveAction::parse("SNAPSHOT"),
            LiveAction::Other("SNAPSHOT".to_string())
        );
        assert_eq!(LiveAction::Update.to_string(), "UPDATE");
    }
}
