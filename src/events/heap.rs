use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::domain::{Event, Priority};
use crate::error::{GridError, GridResult};

pub const DEFAULT_HEAP_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeapStats {
    pub current_size: usize,
    pub max_size: usize,
    pub dropped: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    priority: Priority,
    seq: u64,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    // Most urgent (lowest number), then earliest pushed, compares greatest;
    // the least urgent, newest entry is the smallest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded min-heap of events by priority, FIFO among equal priorities
///
/// When full, the least urgent and newest event is dropped to make room,
/// which may be the incoming one. Urgent events are never displaced by less
/// urgent ones.
#[derive(Debug, Clone)]
pub struct PriorityHeap {
    entries: BTreeSet<Entry>,
    max_size: usize,
    seq: u64,
    dropped: u64,
}

impl PriorityHeap {
    pub fn new(max_size: usize) -> GridResult<Self> {
        if max_size == 0 {
            return Err(GridError::validation(
                "priority_heap",
                "max_size must be >= 1",
            ));
        }
        Ok(Self {
            entries: BTreeSet::new(),
            max_size,
            seq: 0,
            dropped: 0,
        })
    }

    /// Insert `event`; returns the dropped event when the heap was full
    pub fn push(&mut self, event: Event) -> Option<Event> {
        self.seq += 1;
        self.entries.insert(Entry {
            priority: event.priority(),
            seq: self.seq,
            event,
        });
        if self.entries.len() > self.max_size {
            self.dropped += 1;
            return self.entries.pop_first().map(|entry| entry.event);
        }
        None
    }

    /// Remove the most urgent event
    pub fn pop(&mut self) -> GridResult<Event> {
        self.entries
            .pop_last()
            .map(|entry| entry.event)
            .ok_or(GridError::Empty {
                structure: "priority heap",
            })
    }

    pub fn peek(&self) -> Option<&Event> {
        self.entries.last().map(|entry| &entry.event)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending events with priority at or above `threshold`, most urgent first
    pub fn critical_events(&self, threshold: Priority) -> Vec<Event> {
        self.entries
            .iter()
            .rev()
            .take_while(|entry| entry.priority <= threshold)
            .map(|entry| entry.event.clone())
            .collect()
    }

    /// Every pending event in pop order
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.iter().rev().map(|entry| entry.event.clone()).collect()
    }

    /// Keep only events matching `keep`; removed events are not counted as dropped
    pub fn retain<F: FnMut(&Event) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| keep(&entry.event));
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            current_size: self.entries.len(),
            max_size: self.max_size,
            dropped: self.dropped,
        }
    }
}
