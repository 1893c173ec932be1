//! Engine Protocol
//!
//! Everything that crosses the boundary between the adapter and the embedded
//! engine: request/response/notification shapes, the RPC method table, the
//! CBOR codec and the error taxonomy.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                     Engine Protocol                         |
//! +-------------------------------------------------------------+
//! |  Request:      {id, method, params}        -> CBOR blob     |
//! |  Response:     CBOR blob -> result value   (one per request)|
//! |  Notification: CBOR blob -> {id, action, result}            |
//! +-------------------------------------------------------------+
//! |  Errors: adapter-level (AdapterError) vs per-call (RpcError)|
//! +-------------------------------------------------------------+
//! ```
//!
//! # Module Structure
//!
//! - `wire` - Structured request/response/notification types
//! - `method` - RPC method kinds and their connection-state side effects
//! - `codec` - CBOR encode/decode
//! - `error` - Adapter and engine error types

pub mod codec;
pub mod error;
pub mod method;
pub mod wire;

// Re-export error types
pub use error::{AdapterError, EngineError};

// Re-export wire types
pub use wire::{
    LiveAction, Notification, PendingCall, RpcError, RpcRequest, RpcResponse, INTERNAL_ERROR_CODE,
};

pub use codec::CodecError;
pub use method::{Method, SideEffect};

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
