//! Session events and transient notifications, fanned out over a broadcast
//! channel to WebSocket clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::onboarding::session::SessionSnapshot;
use crate::workflow::EditorGraph;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A short-lived message for the user ("toast").
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub session_id: Uuid,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(session_id: Uuid, level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Full session state (sent on connect).
    SessionSync { snapshot: SessionSnapshot },
    /// The editor arrays changed.
    GraphUpdated {
        session_id: Uuid,
        generation: u64,
        editor: EditorGraph,
        can_undo: bool,
        can_redo: bool,
    },
    Notification { notification: Notification },
    /// The session was torn down.
    SessionClosed { session_id: Uuid, completed: bool },
}

impl SessionEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::SessionSync { snapshot } => snapshot.id,
            Self::GraphUpdated { session_id, .. } | Self::SessionClosed { session_id, .. } => {
                *session_id
            }
            Self::Notification { notification } => notification.session_id,
        }
    }
}

/// Broadcast hub for session events.
pub struct EventHub {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { tx })
    }

    /// Subscribe to events for all sessions. Each WS client calls this and
    /// filters by session id.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        // Ok if no receivers are listening
        let _ = self.tx.send(event);
    }

    /// Publish a notification and log it at a matching level.
    pub fn notify(&self, session_id: Uuid, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification::new(session_id, level, message);
        match level {
            NotificationLevel::Warning | NotificationLevel::Error => {
                warn!(session_id = %session_id, message = %notification.message, "Notification")
            }
            _ => debug!(session_id = %session_id, message = %notification.message, "Notification"),
        }
        self.publish(SessionEvent::Notification { notification });
    }
}
