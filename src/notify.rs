//! Push notifications to the UI.
//!
//! Fire-and-forget: the pipeline never waits on subscribers.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::channels::MessageRecord;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Unresolved emails kept for replay; the oldest are dropped beyond this.
pub const MAX_VISIBLE: usize = 200;

/// An event pushed to the UI.
///
/// Wire shape: `{"event": "new_email", "data": {...}}` or
/// `{"event": "remove_email", "data": "<id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    NewEmail(MessageRecord),
    #[serde(rename = "remove_email")]
    RemovedEmail(String),
}

/// Consumer of pipeline events.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Broadcast-backed sink shared with WebSocket clients.
///
/// Remembers emails announced but not yet removed so late subscribers can
/// be brought up to date. Emails whose reply failed never get a removal, so
/// this set is capped at `MAX_VISIBLE`.
pub struct Notifier {
    tx: broadcast::Sender<NotificationEvent>,
    visible: Mutex<Vec<MessageRecord>>,
}

impl Notifier {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            tx,
            visible: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to live events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    /// Emails currently shown in the UI, oldest first.
    pub fn visible(&self) -> Vec<MessageRecord> {
        self.visible
            .lock()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl NotificationSink for Notifier {
    fn notify(&self, event: NotificationEvent) {
        {
            let mut visible = self.visible.lock().unwrap_or_else(|p| p.into_inner());
            match &event {
                NotificationEvent::NewEmail(record) => {
                    visible.retain(|r| r.id != record.id);
                    visible.push(record.clone());
                    if visible.len() > MAX_VISIBLE {
                        let dropped = visible.len() - MAX_VISIBLE;
                        visible.drain(..dropped);
                        debug!(dropped, "Unresolved email list full, dropped oldest");
                    }
                }
                NotificationEvent::RemovedEmail(id) => visible.retain(|r| &r.id != id),
            }
        }

        // Ok if no receivers are listening yet
        if self.tx.send(event).is_err() {
            debug!("No UI subscribers for notification");
        }
    }
}
