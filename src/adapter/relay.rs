//! Notification relay.
//!
//! One background task per connected lifetime. It drains the engine's
//! notification stream, decodes each blob and hands it to the event emitter,
//! in stream order. The task ends when the stream completes, when a read
//! fails, or when [`RelayHandle::stop`] signals it. `stop` waits for the task
//! to exit, so nothing is emitted once it returns.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{EventEmitter, LiveEvent};
use crate::engine::NotificationStream;
use crate::protocol::codec;

pub(crate) struct RelayHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub(crate) fn spawn(stream: NotificationStream, events: Arc<EventEmitter>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(stream, events, shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Ask the task to exit without waiting for it.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal the task and wait until it has exited.
    pub(crate) async fn stop(self) {
        self.signal();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(error = %e, "relay_task_panicked");
            }
        }
    }
}

async fn run(
    mut stream: NotificationStream,
    events: Arc<EventEmitter>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!("relay_started");
    let mut relayed: u64 = 0;

    loop {
        let item = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            item = stream.next() => item,
        };

        let bytes = match item {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!(error = %e, "relay_read_failed");
                break;
            }
            None => {
                debug!("relay_stream_closed");
                break;
            }
        };

        let notification = match codec::decode_notification(&bytes) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "relay_decode_failed");
                continue;
            }
        };

        // Items without a usable id belong to no live query.
        if let Some(subscription_id) = notification.id.filter(|id| !id.is_empty()) {
            events.emit_live(LiveEvent {
                subscription_id,
                action: notification.action,
                result: notification.result,
            });
            relayed += 1;
        }
    }

    info!(relayed, "relay_stopped");
}
