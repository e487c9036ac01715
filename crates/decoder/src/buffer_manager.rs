//! Reusable backing storage for managed pictures.
//!
//! Picture buffers are several megabytes each and a decoder churns through
//! one per frame. The manager keeps released buffers on a free list and hands
//! them out again instead of reallocating.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, trace};

/// A buffer checked out of a [`BufferManager`]. Must be handed back with
/// [`BufferManager::release_buffer`] to be reused.
#[derive(Debug)]
pub struct ManagedBuffer {
    id: u64,
    data: Vec<u8>,
}

impl ManagedBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Buffer manager counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Buffers allocated fresh.
    pub allocated: u64,
    /// Requests served from the free list.
    pub reused: u64,
    /// Buffers currently checked out.
    pub busy: usize,
    /// Buffers waiting on the free list.
    pub free: usize,
}

/// Free/busy pool of picture backing buffers.
#[derive(Default)]
pub struct BufferManager {
    free: Vec<Vec<u8>>,
    busy: HashSet<u64>,
    next_id: u64,
    allocated: u64,
    reused: u64,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a zero-filled buffer of exactly `size` bytes, reusing a free
    /// one when available.
    pub fn get_buffer(&mut self, size: usize) -> ManagedBuffer {
        let data = match self.free.pop() {
            Some(mut data) => {
                data.clear();
                data.resize(size, 0);
                self.reused += 1;
                data
            }
            None => {
                self.allocated += 1;
                vec![0; size]
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.busy.insert(id);
        trace!(id, size, busy = self.busy.len(), "Buffer checked out");
        ManagedBuffer { id, data }
    }

    /// Return a buffer to the free list. Returns `false` (and drops the
    /// buffer) if it was not checked out of this manager.
    pub fn release_buffer(&mut self, buffer: ManagedBuffer) -> bool {
        if !self.busy.remove(&buffer.id) {
            debug!(id = buffer.id, "Released a buffer this manager does not own");
            return false;
        }
        self.free.push(buffer.data);
        true
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            allocated: self.allocated,
            reused: self.reused,
            busy: self.busy.len(),
            free: self.free.len(),
        }
    }
}
