//! # Embedded Engine Adapter
//!
//! Async adapter around an embedded database engine. The engine is opaque: it
//! is constructed for an endpoint, takes one CBOR request blob per call and
//! replies with one CBOR blob, and pushes live-query notifications on a
//! separate stream.
//!
//! ## Pipeline
//!
//! ```text
//! application
//!     │ connect / rpc / disconnect
//!     ↓
//! [EmbeddedAdapter]        → connection state machine, side effects
//!     ├── [codec]          → {id, method, params} ⇄ CBOR
//!     ├── [Engine]         → execute / notifications / release
//!     └── [relay]          → notification stream → live-<id> listeners
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use engine_adapter::{ConnectionOptions, EmbeddedAdapter, MemoryConnector};
//! use serde_json::json;
//!
//! let adapter = EmbeddedAdapter::new(MemoryConnector::new());
//! adapter.connect("mem://", ConnectionOptions::default().strict(true)).await?;
//! adapter.call("use", vec![json!("test"), json!("test")]).await?;
//! let created = adapter.call("create", vec![json!("person")]).await?;
//! adapter.disconnect().await?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `adapter` | Connection lifecycle, RPC dispatch, event surface |
//! | `engine` | Engine collaborator traits, endpoints, in-memory engine |
//! | `protocol` | Wire types, method table, CBOR codec, errors |
//! | `config` | Hierarchical configuration |
//! | `logging` | Tracing subscriber bootstrap |

pub mod adapter;
pub mod config;
pub mod engine;
pub mod logging;
pub mod protocol;

// Re-export public types
pub use adapter::{
    live_channel_name, ConnectionState, ConnectionStatus, EmbeddedAdapter, LiveEvent, StatusEvent,
};
pub use config::{AdapterConfig, CapabilitiesConfig, ConnectionOptions, Credentials};
pub use engine::{Endpoint, EndpointKind, Engine, EngineConnector, MemoryConnector, MemoryEngine};
pub use protocol::{
    AdapterError, AdapterResult, EngineError, LiveAction, Method, Notification, RpcError,
    RpcRequest, RpcResponse,
};
