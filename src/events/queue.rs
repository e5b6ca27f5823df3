use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::{Event, EventKind};
use crate::error::{GridError, GridResult};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    pub processed: u64,
    pub dropped: u64,
    pub utilization: f64,
}

/// Bounded FIFO of events in arrival order
///
/// When full, enqueueing evicts the oldest event and counts it as dropped.
/// The newest data is always accepted.
#[derive(Debug, Clone)]
pub struct EventQueue {
    buf: VecDeque<Event>,
    max_size: usize,
    processed: u64,
    dropped: u64,
}

impl EventQueue {
    pub fn new(max_size: usize) -> GridResult<Self> {
        if max_size == 0 {
            return Err(GridError::validation(
                "event_queue",
                "max_size must be >= 1",
            ));
        }
        Ok(Self {
            buf: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            processed: 0,
            dropped: 0,
        })
    }

    /// Append `event`; returns the evicted event when the queue was full
    pub fn enqueue(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.buf.len() == self.max_size {
            self.dropped += 1;
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(event);
        evicted
    }

    pub fn dequeue(&mut self) -> GridResult<Event> {
        let event = self.buf.pop_front().ok_or(GridError::Empty {
            structure: "event queue",
        })?;
        self.processed += 1;
        Ok(event)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.buf.front()
    }

    pub fn events_by_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.buf.iter().filter(move |e| e.kind() == kind)
    }

    /// Keep only events matching `keep`; returns how many were removed.
    /// Removed events count as neither processed nor dropped.
    pub fn retain<F: FnMut(&Event) -> bool>(&mut self, keep: F) -> usize {
        let before = self.buf.len();
        self.buf.retain(keep);
        before - self.buf.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.buf.iter()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.buf.len(),
            max_size: self.max_size,
            processed: self.processed,
            dropped: self.dropped,
            utilization: self.buf.len() as f64 / self.max_size as f64,
        }
    }
}
