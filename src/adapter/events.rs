//! Event surface: lifecycle status and live notifications.
//!
//! The two kinds travel on separate typed channels. Status changes go to a
//! broadcast channel every subscriber sees. Live notifications are routed per
//! subscription id to the listeners registered for that id only.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use super::state::ConnectionStatus;
use crate::protocol::{AdapterError, LiveAction};

/// One lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub status: ConnectionStatus,
    /// Set on the transition into `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterError>,
}

/// One relayed live notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveEvent {
    pub subscription_id: String,
    pub action: Option<LiveAction>,
    pub result: Value,
}

impl LiveEvent {
    /// Conventional name of the channel this event is delivered on.
    pub fn channel_name(&self) -> String {
        live_channel_name(&self.subscription_id)
    }
}

pub fn live_channel_name(subscription_id: &str) -> String {
    format!("live-{subscription_id}")
}

pub(crate) struct EventEmitter {
    status: broadcast::Sender<StatusEvent>,
    live: DashMap<String, Vec<mpsc::UnboundedSender<LiveEvent>>>,
}

impl EventEmitter {
    pub(crate) fn new(status_capacity: usize) -> Self {
        let (status, _) = broadcast::channel(status_capacity.max(1));
        Self {
            status,
            live: DashMap::new(),
        }
    }

    pub(crate) fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub(crate) fn emit_status(&self, status: ConnectionStatus, error: Option<AdapterError>) {
        // No receivers is fine; status is also readable from the adapter.
        let _ = self.status.send(StatusEvent { status, error });
    }

    pub(crate) fn subscribe_live(&self, subscription_id: &str) -> mpsc::UnboundedReceiver<LiveEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.live
            .entry(subscription_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub(crate) fn unsubscribe_live(&self, subscription_id: &str) -> bool {
        self.live.remove(subscription_id).is_some()
    }

    /// Deliver to every open listener of the event's id. Returns how many got it.
    pub(crate) fn emit_live(&self, event: LiveEvent) -> usize {
        let delivered = match self.live.get_mut(&event.subscription_id) {
            Some(mut listeners) => {
                listeners.retain(|tx| tx.send(event.clone()).is_ok());
                listeners.len()
            }
            None => 0,
        };
        if delivered == 0 {
            self.live
                .remove_if(&event.subscription_id, |_, listeners| listeners.is_empty());
            trace!(subscription_id = %event.subscription_id, "live_event_dropped");
        }
        delivered
    }

    pub(crate) fn live_listener_count(&self, subscription_id: &str) -> usize {
        self.live
            .get(subscription_id)
            .map_or(0, |listeners| listeners.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, action: LiveAction, result: Value) -> LiveEvent {
        LiveEvent {
            subscription_id: id.to_string(),
            action: Some(action),
            result,
        }
    }

    #[tokio::test]
    async fn test_live_events_routed_by_id() {
        let emitter = EventEmitter::new(8);
        let mut seven = emitter.subscribe_live("7");
        let mut eight = emitter.subscribe_live("8");

        assert_eq!(emitter.emit_live(event("7", LiveAction::Create, json!("A"))), 1);
        assert_eq!(emitter.emit_live(event("7", LiveAction::Update, json!("B"))), 1);

        let first = seven.recv().await.unwrap();
        let second = seven.recv().await.unwrap();
        assert_eq!(first.result, json!("A"));
        assert_eq!(second.action, Some(LiveAction::Update));
        assert_eq!(first.channel_name(), "live-7");
        assert!(eight.try_recv().is_err());
    }

    #[test]
    fn test_event_without_listeners_is_dropped() {
        let emitter = EventEmitter::new(8);
        assert_eq!(emitter.emit_live(event("x", LiveAction::Delete, Value::Null)), 0);
        assert_eq!(emitter.live_listener_count("x"), 0);
    }

    #[test]
    fn test_closed_listeners_pruned() {
        let emitter = EventEmitter::new(8);
        let rx = emitter.subscribe_live("a");
        let _kept = emitter.subscribe_live("a");
        drop(rx);
        assert_eq!(emitter.emit_live(event("a", LiveAction::Create, Value::Null)), 1);
        assert_eq!(emitter.live_listener_count("a"), 1);
    }

    #[test]
    fn test_unsubscribe_live() {
        let emitter = EventEmitter::new(8);
        let mut rx = emitter.subscribe_live("a");
        assert!(emitter.unsubscribe_live("a"));
        assert!(!emitter.unsubscribe_live("a"));
        emitter.emit_live(event("a", LiveAction::Create, Value::Null));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_broadcast() {
        let emitter = EventEmitter::new(0);
        let mut rx = emitter.subscribe_status();
        emitter.emit_status(ConnectionStatus::Connecting, None);
        let got = rx.recv().await.unwrap();
        assert_eq!(got.status, ConnectionStatus::Connecting);
        assert!(got.error.is_none());
    }

    #[test]
    fn test_live_event_serializes_action_as_string() {
        let value = serde_json::to_value(event("1", LiveAction::Create, json!({}))).unwrap();
        assert_eq!(value["action"], json!("CREATE"));
    }
}
