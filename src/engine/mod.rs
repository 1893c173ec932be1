//! Engine Collaborator
//!
//! The embedded database engine is opaque to the adapter. It is reached only
//! through the two traits below:
//!
//! ```text
//! EngineConnector::construct(endpoint, options) -> Arc<dyn Engine>
//!     Engine::execute(request bytes)  -> response bytes   (one reply per request)
//!     Engine::notifications()         -> stream of notification blobs
//!     Engine::version()               -> version string
//!     Engine::release()               -> frees native resources (once, at disconnect)
//! ```
//!
//! `memory` provides an in-process implementation used by the test suite and
//! the demo.

pub mod endpoint;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::ConnectionOptions;
use crate::protocol::EngineError;

pub use endpoint::{Endpoint, EndpointKind};
pub use memory::{MemoryConnector, MemoryEngine};

/// Stream of raw notification blobs. Ends when the engine closes it.
pub type NotificationStream = BoxStream<'static, Result<Vec<u8>, EngineError>>;

/// A live engine instance.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Submit one encoded request and wait for its single encoded reply.
    async fn execute(&self, request: Vec<u8>) -> Result<Vec<u8>, EngineError>;

    /// Open a reader over the engine's live notifications.
    fn notifications(&self) -> Result<NotificationStream, EngineError>;

    fn version(&self) -> String;

    /// Release native resources. Closes the notification stream.
    fn release(&self);
}

/// Creates engine instances for an endpoint.
#[async_trait]
pub trait EngineConnector: Send + Sync + 'static {
    async fn construct(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Engine>, EngineError>;
}

#[async_trait]
impl<T: EngineConnector + ?Sized> EngineConnector for Arc<T> {
    async fn construct(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Engine>, EngineError> {
        (**self).construct(endpoint, options).await
    }
}
