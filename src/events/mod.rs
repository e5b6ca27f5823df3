//! # Event Subsystem
//!
//! Every published event lands in two independent views: a bounded FIFO for
//! arrival-order consumers and a priority heap for urgency-order consumers.
//! Consuming from one view never affects the other.

pub mod heap;
pub mod queue;

pub use heap::*;
pub use queue::*;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EventsConfig;
use crate::domain::{Event, EventKind, Priority};
use crate::error::{GridError, GridResult};
use crate::repo::GridStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventStats {
    pub queue: QueueStats,
    pub heap: HeapStats,
    pub critical_pending: usize,
}

pub struct EventBus {
    queue: Mutex<EventQueue>,
    heap: Mutex<PriorityHeap>,
    critical_threshold: Priority,
    store: Arc<dyn GridStore>,
}

impl EventBus {
    pub fn new(cfg: &EventsConfig, store: Arc<dyn GridStore>) -> GridResult<Self> {
        let critical_threshold = Priority::try_from(cfg.critical_threshold)
            .map_err(|message| GridError::validation("event_bus", message))?;
        Ok(Self {
            queue: Mutex::new(EventQueue::new(cfg.queue_capacity)?),
            heap: Mutex::new(PriorityHeap::new(cfg.heap_capacity)?),
            critical_threshold,
            store,
        })
    }

    pub fn critical_threshold(&self) -> Priority {
        self.critical_threshold
    }

    pub fn is_critical(&self, event: &Event) -> bool {
        event.priority() <= self.critical_threshold
    }

    /// Hand an event to both views; critical events are also committed to the store
    pub fn publish(&self, event: Event) {
        let critical = self.is_critical(&event);
        if critical {
            warn!(
                node_id = %event.node_id,
                kind = %event.kind(),
                priority = %event.priority(),
                "Critical grid event"
            );
        } else {
            debug!(node_id = %event.node_id, kind = %event.kind(), "Grid event");
        }

        if let Some(evicted) = self.queue.lock().enqueue(event.clone()) {
            debug!(event_id = %evicted.id, "Event queue full; dropped oldest event");
        }
        if let Some(evicted) = self.heap.lock().push(event.clone()) {
            debug!(event_id = %evicted.id, "Priority heap full; dropped least urgent event");
        }

        if critical {
            if let Err(e) = self.store.commit_event(&event) {
                warn!(event_id = %event.id, error = %e, "Failed to persist critical event");
            }
        }
    }

    pub fn dequeue(&self) -> GridResult<Event> {
        self.queue.lock().dequeue()
    }

    pub fn pop_priority(&self) -> GridResult<Event> {
        self.heap.lock().pop()
    }

    pub fn peek_queue(&self) -> Option<Event> {
        self.queue.lock().peek().cloned()
    }

    pub fn peek_priority(&self) -> Option<Event> {
        self.heap.lock().peek().cloned()
    }

    /// Pending heap events at or above `threshold` (default: the configured one)
    pub fn critical_events(&self, threshold: Option<Priority>) -> Vec<Event> {
        self.heap
            .lock()
            .critical_events(threshold.unwrap_or(self.critical_threshold))
    }

    pub fn events_by_kind(&self, kind: EventKind) -> Vec<Event> {
        self.queue.lock().events_by_kind(kind).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.heap.lock().snapshot()
    }

    /// Empty both views; returns (queue, heap) counts removed
    pub fn clear(&self) -> (usize, usize) {
        let q = self.queue.lock().clear();
        let h = self.heap.lock().clear();
        (q, h)
    }

    /// Purge pending `overload_detected` events for `node_ids` from both views
    pub fn clear_overloads_for(&self, node_ids: &[String]) -> usize {
        if node_ids.is_empty() {
            return 0;
        }
        let ids: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
        let stale =
            |e: &Event| e.kind() == EventKind::OverloadDetected && ids.contains(e.node_id.as_str());

        let mut removed = self.queue.lock().retain(|e| !stale(e));
        removed += self.heap.lock().retain(|e| !stale(e));
        if removed > 0 {
            debug!(removed, nodes = node_ids.len(), "Purged resolved overload events");
        }
        removed
    }

    pub fn stats(&self) -> EventStats {
        let queue = self.queue.lock().stats();
        let heap = self.heap.lock();
        EventStats {
            queue,
            heap: heap.stats(),
            critical_pending: heap.critical_events(self.critical_threshold).len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventData;
    use crate::repo::MemoryStore;

    fn bus(capacity: usize) -> (EventBus, Arc<MemoryStore>) {
        bus_with(capacity, 1000)
    }

    fn bus_with(queue: usize, heap: usize) -> (EventBus, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cfg = EventsConfig {
            queue_capacity: queue,
            heap_capacity: heap,
            critical_threshold: 3,
        };
        (EventBus::new(&cfg, store.clone()).unwrap(), store)
    }

    fn overload(id: &str, utilization: f64) -> Event {
        Event::new(
            id,
            EventData::OverloadDetected {
                load: utilization * 100.0,
                capacity: 100.0,
                utilization,
            },
        )
    }

    #[test]
    fn test_views_are_independent() {
        let (bus, _) = bus(10);
        bus.publish(overload("a", 0.95));
        bus.publish(Event::new("b", EventData::Recovery { restored_edges: 1 }));

        assert_eq!(bus.dequeue().unwrap().node_id, "a");
        assert_eq!(bus.stats().heap.current_size, 2);
        assert_eq!(bus.pop_priority().unwrap().node_id, "a");
        assert_eq!(bus.peek_queue().unwrap().node_id, "b");
    }

    #[test]
    fn test_only_critical_events_are_persisted() {
        let (bus, store) = bus(10);
        bus.publish(overload("a", 0.95));
        bus.publish(Event::new("b", EventData::Recovery { restored_edges: 1 }));
        assert_eq!(store.events().len(), 1);

        store.set_failing(true);
        bus.publish(overload("c", 1.1));
        assert_eq!(bus.critical_events(None).len(), 2);
    }

    #[test]
    fn test_clear_overloads_for() {
        let (bus, _) = bus(10);
        bus.publish(overload("a", 0.95));
        bus.publish(overload("b", 0.95));
        bus.publish(Event::new("a", EventData::Recovery { restored_edges: 1 }));

        assert_eq!(bus.clear_overloads_for(&["a".to_string()]), 2);
        assert_eq!(bus.events_by_kind(EventKind::OverloadDetected).len(), 1);
        assert_eq!(bus.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_publishers() {
        let (bus, _) = bus(50);
        std::thread::scope(|s| {
            for t in 0..4 {
                let bus = &bus;
                s.spawn(move || {
                    for i in 0..25 {
                        bus.publish(overload(&format!("t{t}-{i}"), 0.92));
                    }
                });
            }
        });
        let stats = bus.stats();
        assert_eq!(stats.queue.current_size, 50);
        assert_eq!(stats.queue.dropped, 50);
        assert_eq!(stats.heap.current_size, 100);
    }

    #[test]
    fn test_both_views_stay_bounded() {
        let (bus, _) = bus_with(10, 10);
        bus.publish(Event::new(
            "sub",
            EventData::Failure {
                previous_load: 100.0,
                failed_edges: 2,
                duration_hours: 1.0,
            },
        ));
        for i in 0..999 {
            bus.publish(overload(&format!("n{i}"), 0.95));
        }

        let stats = bus.stats();
        assert_eq!(stats.queue.current_size, 10);
        assert_eq!(stats.queue.dropped, 990);
        assert_eq!(stats.heap.current_size, 10);
        assert_eq!(stats.heap.dropped, 990);
        // The failure outranks every overload, so it is never the one dropped
        assert_eq!(bus.pop_priority().unwrap().node_id, "sub");
        assert_eq!(bus.pop_priority().unwrap().node_id, "n0");
    }
}
