use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Language, ListKind};

/// Committed change to the store. Sent only after the owning transaction
/// commits, so a subscriber never sees a partially applied update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    QuestionChanged { id: i64 },
    ListsChanged { kinds: Vec<ListKind> },
    ReminderChanged { id: Uuid },
    NoteChanged { question_id: i64 },
    SolutionChanged { question_id: i64, language: Language },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error
        if self.sender.send(event).is_err() {
            tracing::trace!("Store event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
