//! Event bridge between the backend and the display surface.
//!
//! The backend emits [`UiEvent`]s; exactly one surface at a time receives
//! them through a [`Subscription`]. Events are delivered at most once and in
//! emission order. Nothing is buffered for a surface that is not attached yet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::task::Task;

/// Result of a remote save, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveStatus {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outbound events for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum UiEvent {
    /// A short message to show to the user.
    Notification(String),
    /// Whether the user is signed in.
    AuthenticationStatus(bool),
    /// Outcome of a remote save.
    SaveStatus(SaveStatus),
    /// Tasks loaded from the remote file; they replace the local list.
    #[serde(rename = "load-drive-todos")]
    LoadedTodos(Vec<Task>),
}

impl UiEvent {
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification(message.into())
    }
}

/// Inbound commands from the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Start the sign-in flow.
    Login,
    /// Upload the given list to the remote file.
    Save(Vec<Task>),
    /// Download the remote file.
    Load,
}

struct Surface {
    id: u64,
    tx: mpsc::UnboundedSender<UiEvent>,
}

#[derive(Default)]
struct Inner {
    surface: Mutex<Option<Surface>>,
    next_id: AtomicU64,
}

/// Forwards backend events to the active surface.
///
/// Cloning is cheap; all clones share the same surface slot.
#[derive(Clone, Default)]
pub struct EventBridge {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a surface, replacing the current one if any.
    pub fn attach(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self.inner.surface.lock().unwrap().replace(Surface { id, tx });
        if let Some(previous) = previous {
            debug!(previous = previous.id, current = id, "replaced display surface");
        }

        Subscription {
            id,
            rx,
            bridge: self.clone(),
        }
    }

    /// Returns true if a surface is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.surface.lock().unwrap().is_some()
    }

    /// Delivers an event to the attached surface.
    ///
    /// Returns false when no surface received it.
    pub fn emit(&self, event: UiEvent) -> bool {
        let mut slot = self.inner.surface.lock().unwrap();
        let Some(surface) = slot.as_ref() else {
            debug!(?event, "no display surface attached, dropping event");
            return false;
        };

        if surface.tx.send(event).is_err() {
            // Receiver went away without detaching.
            *slot = None;
            return false;
        }
        true
    }

    fn detach(&self, id: u64) {
        let mut slot = self.inner.surface.lock().unwrap();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
            debug!(id, "detached display surface");
        }
    }
}

/// Receiving end held by a display surface.
///
/// Dropping it deregisters the surface.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<UiEvent>,
    bridge: EventBridge,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once this surface was replaced
    /// and all delivered events have been read.
    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.rx.recv().await
    }

    /// Returns the next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every event delivered so far.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Deregisters this surface.
    pub fn detach(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bridge.detach(self.id);
    }
}
