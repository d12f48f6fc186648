use super::tracker::ActivityTracker;
use crate::core::DocumentKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 256;

/// Document lifecycle signals, both host-originated and engine-originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// A document was selected or focused (e.g. its token was controlled)
    Selected(DocumentKey),
    Updated(DocumentKey),
    /// An embedded child changed; the parent counts as active
    ChildUpdated { parent: DocumentKey },
    Hydrated(DocumentKey),
    SwappedOut(DocumentKey),
}

impl Signal {
    /// The document whose activity this signal represents, if it is an activity signal.
    pub fn activity_key(&self) -> Option<&DocumentKey> {
        match self {
            Self::Selected(key) | Self::Updated(key) | Self::Hydrated(key) => Some(key),
            Self::ChildUpdated { parent } => Some(parent),
            Self::SwappedOut(_) => None,
        }
    }
}

/// Fan-out for [`Signal`]s.
///
/// Activity is recorded in the tracker before the signal is broadcast, so a
/// scan that starts after `emit` returns always sees the touch.
#[derive(Clone)]
pub struct SignalBus {
    tracker: Arc<ActivityTracker>,
    sender: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(tracker: Arc<ActivityTracker>) -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tracker, sender }
    }

    pub fn emit(&self, signal: Signal) {
        if let Some(key) = signal.activity_key() {
            self.tracker.touch(key);
        }
        // No subscribers is fine.
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }
}
