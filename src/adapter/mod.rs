//! Embedded Engine Adapter
//!
//! Owns one engine instance at a time and exposes it as an asynchronous
//! RPC endpoint with a status and live-notification event surface.
//!
//! # Architecture
//!
//! ```text
//! connect(endpoint) --> setup task (shared by concurrent callers)
//!                          |  transition gate (write)
//!                          v
//!             EngineConnector::construct --> Arc<dyn Engine>
//!                          |
//!                          +--> RelayHandle: notifications() -> EventEmitter (live-<id>)
//!
//! rpc(request) --> transition gate (read) --> id --> encode --> execute --> decode
//!                                                            |
//!                                             side effect on ConnectionState
//! ```
//!
//! # Lifecycle
//!
//! `Disconnected -> Connecting -> Connected | Error`, and back to
//! `Disconnected` on `disconnect`. `Error` is not terminal; any later
//! `connect` starts over. `disconnect` always wins a race with a pending
//! `connect`: it waits for the setup to settle, then tears down whatever it
//! produced.

pub mod events;
pub mod id;
pub(crate) mod relay;
pub mod state;

use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::config::{AdapterConfig, ConnectionOptions};
use crate::engine::{Endpoint, Engine, EngineConnector};
use crate::protocol::{codec, AdapterError, AdapterResult, Method, RpcError, RpcRequest, RpcResponse};

pub use events::{live_channel_name, LiveEvent, StatusEvent};
pub use id::next_request_id;
pub use state::{ConnectionState, ConnectionStatus};

use events::EventEmitter;
use relay::RelayHandle;

type SetupFuture = Shared<BoxFuture<'static, AdapterResult<()>>>;

/// Handle to an embedded engine connection. Cheap to clone; clones share the
/// same connection.
#[derive(Clone)]
pub struct EmbeddedAdapter {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn EngineConnector>,
    default_options: ConnectionOptions,
    state: RwLock<ConnectionState>,
    /// Held exclusively while connecting or disconnecting; shared by `rpc`.
    transition: tokio::sync::RwLock<()>,
    /// The connect in progress, if any.
    setup: Mutex<Option<SetupFuture>>,
    relay: Mutex<Option<RelayHandle>>,
    events: Arc<EventEmitter>,
}

impl EmbeddedAdapter {
    pub fn new(connector: impl EngineConnector) -> Self {
        Self::from_config(connector, &AdapterConfig::default())
    }

    /// Build an adapter whose `connect_default` uses the configured options.
    pub fn from_config(connector: impl EngineConnector, config: &AdapterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                default_options: config.connection.clone(),
                state: RwLock::new(ConnectionState::default()),
                transition: tokio::sync::RwLock::new(()),
                setup: Mutex::new(None),
                relay: Mutex::new(None),
                events: Arc::new(EventEmitter::new(config.events.status_capacity)),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect to `endpoint`.
    ///
    /// A connect already in flight is joined instead of starting a second
    /// engine; the joined caller gets the same outcome. If a connection is
    /// already up it is torn down first.
    pub async fn connect(&self, endpoint: &str, options: ConnectionOptions) -> AdapterResult<()> {
        let setup = {
            let mut slot = self.inner.setup.lock();
            match slot.as_ref() {
                Some(pending) => {
                    debug!(endpoint, "adapter_connect_joined");
                    pending.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let endpoint = endpoint.to_string();
                    let task = tokio::spawn(async move {
                        let outcome = inner.establish(endpoint, options).await;
                        *inner.setup.lock() = None;
                        outcome
                    });
                    let setup = async move { task.await.unwrap_or_else(|e| Err(e.into())) }
                        .boxed()
                        .shared();
                    *slot = Some(setup.clone());
                    setup
                }
            }
        };
        setup.await
    }

    /// Connect with the options this adapter was configured with.
    pub async fn connect_default(&self, endpoint: &str) -> AdapterResult<()> {
        self.connect(endpoint, self.inner.default_options.clone())
            .await
    }

    /// Close the connection. Returns once the relay has exited and the engine
    /// has been released. Does nothing if there is no connection.
    pub async fn disconnect(&self) -> AdapterResult<()> {
        self.wait_for_setup().await;
        let _gate = self.inner.transition.write().await;
        self.inner.teardown().await;
        Ok(())
    }

    // ========================================================================
    // RPC
    // ========================================================================

    /// Run one call against the engine.
    ///
    /// Fails with `ConnectionUnavailable` when there is no engine. Failures of
    /// the call itself come back as [`RpcResponse::Error`].
    pub async fn rpc(&self, request: RpcRequest) -> AdapterResult<RpcResponse> {
        let engine = self.current_engine().await?;
        let call = request.into_call(next_request_id());
        let span = debug_span!("rpc", id = call.id, method = %call.method);

        async move {
            let outcome = match codec::encode_request(&call) {
                Ok(bytes) => match engine.execute(bytes).await {
                    Ok(reply) => codec::decode_value(&reply).map_err(|e| e.to_string()),
                    Err(e) => Err(e.message()),
                },
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(result) => {
                    {
                        let mut state = self.inner.state.write();
                        // Skip effects if the engine was swapped out mid-call.
                        if state
                            .engine
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &engine))
                        {
                            state.apply(&call.method, &call.params, &result);
                        }
                    }
                    debug!("rpc_ok");
                    Ok(RpcResponse::Result(result))
                }
                Err(message) => {
                    debug!(error = %message, "rpc_failed");
                    Ok(RpcResponse::Error(RpcError::internal(message)))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Shorthand for `rpc(RpcRequest::new(method, params))`.
    pub async fn call(
        &self,
        method: impl Into<Method>,
        params: Vec<Value>,
    ) -> AdapterResult<RpcResponse> {
        self.rpc(RpcRequest::new(method, params)).await
    }

    /// Version string of the connected engine.
    pub async fn version(&self) -> AdapterResult<String> {
        Ok(self.current_engine().await?.version())
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.read().status
    }

    /// Whether an engine handle is present.
    pub fn is_connected(&self) -> bool {
        self.inner.state.read().engine.is_some()
    }

    pub fn endpoint(&self) -> Option<String> {
        self.inner.state.read().endpoint.clone()
    }

    pub fn namespace(&self) -> Option<String> {
        self.inner.state.read().namespace.clone()
    }

    pub fn database(&self) -> Option<String> {
        self.inner.state.read().database.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.read().token.clone()
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe_status()
    }

    /// Listen for notifications of one live query, in stream order.
    pub fn subscribe_live(&self, subscription_id: &str) -> mpsc::UnboundedReceiver<LiveEvent> {
        self.inner.events.subscribe_live(subscription_id)
    }

    /// Drop every listener of `subscription_id`. Returns whether any existed.
    pub fn unsubscribe_live(&self, subscription_id: &str) -> bool {
        self.inner.events.unsubscribe_live(subscription_id)
    }

    pub fn live_listener_count(&self, subscription_id: &str) -> usize {
        self.inner.events.live_listener_count(subscription_id)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn wait_for_setup(&self) {
        let pending = self.inner.setup.lock().clone();
        if let Some(setup) = pending {
            // The outcome belongs to the connect caller.
            let _ = setup.await;
        }
    }

    async fn current_engine(&self) -> AdapterResult<Arc<dyn Engine>> {
        self.wait_for_setup().await;
        let _gate = self.inner.transition.read().await;
        self.inner
            .state
            .read()
            .engine
            .clone()
            .ok_or(AdapterError::ConnectionUnavailable)
    }
}

impl Inner {
    async fn establish(
        self: &Arc<Self>,
        endpoint: String,
        options: ConnectionOptions,
    ) -> AdapterResult<()> {
        let _gate = self.transition.write().await;

        if self.state.read().engine.is_some() {
            info!(endpoint = %endpoint, "adapter_reconnecting");
            self.teardown().await;
        }

        {
            let mut state = self.state.write();
            state.endpoint = Some(endpoint.clone());
            state.status = ConnectionStatus::Connecting;
        }
        self.events.emit_status(ConnectionStatus::Connecting, None);
        info!(endpoint = %endpoint, strict = options.strict, capacity = options.capacity, "adapter_connecting");

        let constructed = match Endpoint::parse(&endpoint) {
            Ok(parsed) => self
                .connector
                .construct(&parsed, &options)
                .await
                .map_err(AdapterError::from),
            Err(e) => Err(e),
        };

        let engine = match constructed {
            Ok(engine) => engine,
            Err(e) => {
                let error = e.into_connection_error();
                self.state.write().status = ConnectionStatus::Error;
                self.events
                    .emit_status(ConnectionStatus::Error, Some(error.clone()));
                warn!(endpoint = %endpoint, error = %error, "adapter_connect_failed");
                return Err(error);
            }
        };

        let notifications = engine.notifications();
        {
            let mut state = self.state.write();
            state.engine = Some(engine);
            state.status = ConnectionStatus::Connected;
        }
        self.events.emit_status(ConnectionStatus::Connected, None);

        match notifications {
            Ok(stream) => {
                *self.relay.lock() = Some(RelayHandle::spawn(stream, self.events.clone()));
            }
            Err(e) => debug!(error = %e, "relay_unavailable"),
        }

        info!(endpoint = %endpoint, "adapter_connected");
        Ok(())
    }

    /// Drop the engine and everything bound to it. Caller holds the
    /// transition gate exclusively.
    async fn teardown(&self) {
        let (engine, previous) = {
            let mut state = self.state.write();
            let previous = state.status;
            state.clear_session();
            state.status = ConnectionStatus::Disconnected;
            (state.engine.take(), previous)
        };

        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            relay.stop().await;
        }
        if let Some(engine) = engine {
            engine.release();
        }

        if previous != ConnectionStatus::Disconnected {
            self.events
                .emit_status(ConnectionStatus::Disconnected, None);
            info!(previous = %previous, "adapter_disconnected");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.get_mut().take() {
            relay.signal();
        }
        if let Some(engine) = self.state.get_mut().engine.take() {
            engine.release();
        }
    }
}

impl fmt::Debug for EmbeddedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedAdapter")
            .field("state", &*self.inner.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryConnector;
    use serde_json::json;

    #[tokio::test]
    async fn test_rpc_before_connect_is_unavailable() {
        let adapter = EmbeddedAdapter::new(MemoryConnector::new());
        let err = adapter.call("ping", vec![]).await.unwrap_err();
        assert_eq!(err, AdapterError::ConnectionUnavailable);
        assert_eq!(adapter.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_use_disconnect() {
        let adapter = EmbeddedAdapter::new(MemoryConnector::new());
        adapter
            .connect("mem://", ConnectionOptions::default())
            .await
            .unwrap();
        assert!(adapter.is_connected());
        assert_eq!(adapter.endpoint().as_deref(), Some("mem://"));

        let res = adapter
            .call("use", vec![json!("test"), json!("test")])
            .await
            .unwrap();
        assert!(res.is_ok());
        assert_eq!(adapter.namespace().as_deref(), Some("test"));

        adapter.disconnect().await.unwrap();
        assert!(!adapter.is_connected());
        assert!(adapter.namespace().is_none());
        assert!(adapter.endpoint().is_none());
    }

    #[tokio::test]
    async fn test_version_requires_connection() {
        let adapter = EmbeddedAdapter::new(MemoryConnector::new());
        assert!(adapter.version().await.is_err());
        adapter.connect_default("memory").await.unwrap();
        assert!(adapter.version().await.unwrap().starts_with("memory-engine-"));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_sets_error() {
        let adapter = EmbeddedAdapter::new(MemoryConnector::new());
        let err = adapter
            .connect("no scheme here", ConnectionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnexpectedConnection { .. }));
        assert_eq!(adapter.status(), ConnectionStatus::Error);
        assert_eq!(adapter.endpoint().as_deref(), Some("no scheme here"));
    }
}
