// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII leases over a codec's fixed buffer slots.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::trace;

type FreeList = Arc<Mutex<VecDeque<(usize, Vec<u8>)>>>;

/// A fixed set of equally sized buffers owned by a codec.
///
/// Buffers are handed out as [`InputSlot`] / [`OutputSlot`] leases. A lease
/// returns its buffer to the pool when dropped, so a slot can neither be used
/// twice nor after it was given back.
#[derive(Clone)]
pub struct SlotPool {
    free: FreeList,
    capacity: usize,
    count: usize,
}

impl SlotPool {
    /// Allocates `count` slots of `capacity` bytes each.
    pub fn new(count: usize, capacity: usize) -> Self {
        let free = (0..count).map(|index| (index, vec![0; capacity])).collect();
        Self {
            free: Arc::new(Mutex::new(free)),
            capacity,
            count,
        }
    }

    /// Size of every slot, in bytes.
    pub fn slot_capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots owned by the pool.
    pub fn slot_count(&self) -> usize {
        self.count
    }

    /// Number of slots currently not leased.
    pub fn available(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take(&self) -> Option<Lease> {
        let (index, buffer) = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;
        Some(Lease {
            index,
            buffer: Some(buffer),
            len: 0,
            free: self.free.clone(),
        })
    }

    /// Leases a free slot for raw input, if any.
    pub fn try_acquire_input(&self) -> Option<InputSlot> {
        self.take().map(|lease| InputSlot { lease })
    }

    /// Leases a free slot for compressed output, if any.
    pub fn try_acquire_output(&self) -> Option<OutputSlot> {
        self.take().map(|lease| OutputSlot { lease, pts_us: 0 })
    }
}

impl fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.capacity)
            .field("count", &self.count)
            .field("available", &self.available())
            .finish()
    }
}

struct Lease {
    index: usize,
    buffer: Option<Vec<u8>>,
    len: usize,
    free: FreeList,
}

impl Lease {
    fn buffer(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }

    fn fill(&mut self, data: &[u8]) -> usize {
        let buffer = self.buffer_mut();
        let len = data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&data[..len]);
        self.len = len;
        len
    }

    fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buffer().len());
    }

    fn data(&self) -> &[u8] {
        &self.buffer()[..self.len]
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            trace!("Returning slot {} to its pool", self.index);
            self.free
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back((self.index, buffer));
        }
    }
}

/// Lease over a codec input slot.
///
/// The holder fills the slot and hands it back through
/// [`crate::AudioCodec::submit`]. Dropping an unsubmitted slot returns it to
/// the pool unused.
pub struct InputSlot {
    lease: Lease,
}

impl InputSlot {
    /// Slot index inside its pool.
    pub fn index(&self) -> usize {
        self.lease.index
    }

    /// Slot size in bytes.
    pub fn capacity(&self) -> usize {
        self.lease.buffer().len()
    }

    /// Whole slot buffer, for in-place filling. Follow with [`Self::set_len`].
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.lease.buffer_mut()
    }

    /// Sets the number of valid bytes, clamped to the capacity.
    pub fn set_len(&mut self, len: usize) {
        self.lease.set_len(len);
    }

    /// Copies as much of `data` as fits and returns the number of bytes copied.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        self.lease.fill(data)
    }

    /// Valid bytes of the slot.
    pub fn data(&self) -> &[u8] {
        self.lease.data()
    }
}

impl fmt::Debug for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSlot")
            .field("index", &self.index())
            .field("len", &self.lease.len)
            .finish()
    }
}

/// Lease over a codec output slot holding one compressed frame.
///
/// Handed out by [`crate::AudioCodec::poll_output`] and returned through
/// [`crate::AudioCodec::release`] (or by dropping it).
pub struct OutputSlot {
    lease: Lease,
    pts_us: u64,
}

impl OutputSlot {
    /// Slot index inside its pool.
    pub fn index(&self) -> usize {
        self.lease.index
    }

    /// Whole slot buffer, for the codec to write into.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.lease.buffer_mut()
    }

    /// Marks the first `len` bytes as the compressed frame.
    pub fn set_len(&mut self, len: usize) {
        self.lease.set_len(len);
    }

    /// Copies `data` into the slot, truncating to its capacity.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        self.lease.fill(data)
    }

    pub fn set_pts_us(&mut self, pts_us: u64) {
        self.pts_us = pts_us;
    }

    /// Timestamp the codec attached to the frame.
    pub fn pts_us(&self) -> u64 {
        self.pts_us
    }

    /// The compressed frame.
    pub fn payload(&self) -> &[u8] {
        self.lease.data()
    }
}

impl fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSlot")
            .field("index", &self.index())
            .field("len", &self.lease.len)
            .field("pts_us", &self.pts_us)
            .finish()
    }
}
