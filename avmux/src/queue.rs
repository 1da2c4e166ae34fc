// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! FIFO of frames awaiting serialization.
//!
//! A [`FrameQueue`] is not synchronized on its own: the session keeps both
//! queues behind its single mutex, so producers and the pump always see them
//! together with the session state.

use std::collections::VecDeque;

/// FIFO with an optional capacity and drop-on-overrun accounting.
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
    dropped: u64,
}

impl<T> FrameQueue<T> {
    /// Creates a queue holding at most `capacity` items (`None` = unbounded).
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Appends `item`, or drops it if the queue is full.
    ///
    /// Returns `true` when the item was queued.
    pub fn push(&mut self, item: T) -> bool {
        if self.capacity.is_some_and(|capacity| self.items.len() >= capacity) {
            self.dropped += 1;
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Removes up to `limit` items from the front, in FIFO order (`None` = all).
    pub fn drain(&mut self, limit: Option<usize>) -> Vec<T> {
        let count = limit.map_or(self.items.len(), |limit| limit.min(self.items.len()));
        self.items.drain(..count).collect()
    }

    /// Discards every queued item and returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.items.len();
        self.items.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items refused because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
