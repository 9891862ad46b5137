//! Bounded history of the attached session's events.

use std::collections::VecDeque;

use crate::events::LogEvent;

/// Keeps the most recent events, evicting the oldest past `capacity`.
///
/// Events are stored in arrival order. Sources are not merged by
/// timestamp, so callers that need temporal order use
/// [`chronological`](Self::chronological).
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<LogEvent>,
    capacity: usize,
}

impl EventBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
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

    /// Events in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.events.iter()
    }

    /// Events sorted by timestamp; ties keep arrival order.
    #[must_use]
    pub fn chronological(&self) -> Vec<&LogEvent> {
        let mut events: Vec<_> = self.events.iter().collect();
        events.sort_by_key(|e| e.timestamp);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventContext, EventKind, StopDetails};

    fn event(id: &str, timestamp: i64) -> LogEvent {
        LogEvent {
            id: id.to_string(),
            session_id: "s".to_string(),
            timestamp,
            context: EventContext::default(),
            kind: EventKind::Stop(StopDetails::default()),
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let mut buffer = EventBuffer::new(2);
        buffer.push(event("a", 1));
        buffer.push(event("b", 2));
        buffer.push(event("c", 3));

        let ids: Vec<_> = buffer.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut buffer = EventBuffer::new(0);
        buffer.push(event("a", 1));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_chronological_is_stable() {
        let mut buffer = EventBuffer::new(10);
        buffer.push(event("late", 30));
        buffer.push(event("first", 10));
        buffer.push(event("tie", 10));

        let ids: Vec<_> = buffer.chronological().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "tie", "late"]);
        // Arrival order untouched
        assert_eq!(buffer.iter().next().unwrap().id, "late");
    }

    #[test]
    fn test_clear() {
        let mut buffer = EventBuffer::new(4);
        buffer.push(event("a", 1));
        buffer.clear();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.capacity(), 4);
    }
}
