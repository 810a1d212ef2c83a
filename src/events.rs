//! Progress events from a crew run.
//!
//! The crew emits via [`EventBus::emit`]; the terminal shell subscribes via
//! [`EventBus::subscribe`] to drive its spinner. Built on
//! [`tokio::sync::broadcast`] so several listeners can react independently.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A task moved to Running. `index` is 1-based.
    TaskStarted {
        index: usize,
        total: usize,
        task: String,
        role: String,
    },
    /// An agent called a tool while working on its task.
    ToolUsed {
        role: String,
        tool: String,
        ok: bool,
    },
    TaskCompleted {
        index: usize,
        task: String,
        chars: usize,
    },
    TaskFailed {
        index: usize,
        task: String,
        error: String,
    },
}

#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of receivers that will see the event.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Future events only; nothing is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Event {
        Event::TaskStarted {
            index: 1,
            total: 3,
            task: "analyze_blood_test".to_string(),
            role: "Medical Analyst".to_string(),
        }
    }

    #[tokio::test]
    async fn emit_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(started()), 2);
        assert_eq!(rx1.recv().await.unwrap(), started());
        assert_eq!(rx2.recv().await.unwrap(), started());
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.emit(started()), 0);
    }
}
