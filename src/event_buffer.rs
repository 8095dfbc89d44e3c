//! Bounded FIFO of element state-change records.

use crate::element::ElementIdentifier;
use crate::error::PropertyError;
use std::collections::VecDeque;

pub const EVENT_BUFFER_CAPACITY_MAX: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub element: ElementIdentifier,
    /// Native wire encoding of the new element value.
    pub value: u32,
    /// Milliseconds since the owning controller was created.
    pub timestamp_ms: u64,
    pub sequence: u64,
}

/// Oldest records are dropped when full and the overflow flag is raised
/// until the next successful pop.
#[derive(Debug)]
pub struct EventBuffer {
    records: VecDeque<EventRecord>,
    capacity: usize,
    overflowed: bool,
    next_sequence: u64,
}

impl Default for EventBuffer {
    /// Zero capacity: nothing is buffered until a capacity is set.
    fn default() -> Self {
        Self {
            records: VecDeque::new(),
            capacity: 0,
            overflowed: false,
            next_sequence: 1,
        }
    }
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Result<Self, PropertyError> {
        let mut buffer = Self::default();
        buffer.set_capacity(capacity)?;
        Ok(buffer)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn get(&self, index: usize) -> Option<EventRecord> {
        self.records.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    /// Shrinking below the current length discards the oldest records.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), PropertyError> {
        if capacity > EVENT_BUFFER_CAPACITY_MAX {
            return Err(PropertyError::EventBufferCapacity(capacity));
        }
        self.capacity = capacity;
        if self.records.len() > capacity {
            let excess = self.records.len() - capacity;
            self.records.drain(..excess);
            self.overflowed = true;
        }
        Ok(())
    }

    /// Appends a record stamped with the next sequence number.
    ///
    /// A zero-capacity buffer stores nothing and does not overflow.
    pub fn push(&mut self, element: ElementIdentifier, value: u32, timestamp_ms: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.overflowed = true;
        }
        self.records.push_back(EventRecord {
            element,
            value,
            timestamp_ms,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
    }

    /// Removes up to `count` records from the front.
    pub fn pop_oldest(&mut self, count: usize) -> Vec<EventRecord> {
        let count = count.min(self.records.len());
        let popped: Vec<EventRecord> = self.records.drain(..count).collect();
        if !popped.is_empty() {
            self.overflowed = false;
        }
        popped
    }
}
