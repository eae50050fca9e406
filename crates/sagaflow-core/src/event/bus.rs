//! Broadcast event bus for distributing `WorkflowEvent` to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.
//! Subscribers only see events published after they subscribed, so callers
//! subscribe before starting a run. A broadcast receiver that falls more than
//! `capacity` events behind loses the oldest ones; consumers that need every
//! event read the run's journal (see [`EventBus::recording`]) instead.

use sagaflow_types::event::WorkflowEvent;
use tokio::sync::{broadcast, mpsc};

/// Multi-consumer bus for workflow lifecycle events.
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning the bus clones the
/// sender, allowing multiple producers and consumers.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
    /// Unbounded copy of everything published through this handle.
    journal: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            journal: None,
        }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// A handle on the same channel that also journals every event it
    /// publishes into an unbounded queue. The journal never drops events.
    pub fn recording(&self) -> (EventBus, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (journal, rx) = mpsc::unbounded_channel();
        let bus = Self {
            sender: self.sender.clone(),
            journal: Some(journal),
        };
        (bus, rx)
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: WorkflowEvent) {
        tracing::debug!(
            event = event.kind(),
            step_id = event.step_id().unwrap_or(""),
            "workflow event"
        );
        if let Some(journal) = &self.journal {
            let _ = journal.send(event.clone());
        }
        let _ = self.sender.send(event);
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            journal: self.journal.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .field("recording", &self.journal.is_some())
            .finish()
    }
}

/// Take everything currently queued in a journal, in publish order.
pub fn drain_journal(journal: &mut mpsc::UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = journal.try_recv() {
        events.push(event);
    }
    events
}
