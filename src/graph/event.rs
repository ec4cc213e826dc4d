//! Events met tijdstempel en de begrensde wachtrij die ze vasthoudt.

use std::collections::VecDeque;

use super::node::NodeId;
use super::value::FieldValue;

/// Standaard aantal wachtende events per scene.
pub const MAX_EVENTS: usize = 400;

/// Een nog af te leveren `value` voor `to_node.to_event_in`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: f64,
    pub value: FieldValue,
    pub to_node: NodeId,
    pub to_event_in: String,
}

impl Event {
    #[must_use]
    pub fn new<T: Into<NodeId>, S: Into<String>>(
        timestamp: f64,
        value: FieldValue,
        to_node: T,
        to_event_in: S,
    ) -> Self {
        Self {
            timestamp,
            value,
            to_node: to_node.into(),
            to_event_in: to_event_in.into(),
        }
    }
}

/// FIFO-ring met vaste capaciteit. Een push op een volle wachtrij verdringt
/// het oudste event; aflevering volgt de volgorde van toevoegen, ongeacht de
/// tijdstempels.
#[derive(Debug, Clone)]
pub struct EventQueue {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }
}

impl EventQueue {
    /// Een wachtrij voor hoogstens `capacity` events (minstens één).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Voegt een event toe en geeft het verdrongen hoofd terug als de rij vol was.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.events.len() == self.capacity {
            self.dropped += 1;
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Gooit alle wachtende events weg en geeft terug hoeveel het er waren.
    pub fn clear(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Totaal aantal events dat sinds het aanmaken door overloop verloren ging.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}
