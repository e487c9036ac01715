//! Generation-stamped slot table.
//!
//! Each slot carries a generation counter that doubles as its occupancy flag:
//! odd means occupied, even means free. Allocating bumps the counter to the
//! next odd value and releasing bumps it to the next even value, so a handle
//! minted for an earlier occupant never matches again once its slot has been
//! released.

use std::collections::VecDeque;

use lcevc_common::Handle;
use tracing::debug;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity pool of `T`, addressed by [`Handle<T>`].
pub struct ObjectPool<T> {
    slots: Vec<Slot<T>>,
    /// Released slot indices, reused oldest-first to delay generation reuse.
    free: VecDeque<u32>,
    capacity: usize,
}

impl<T> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        // Index u32::MAX is reserved so that no handle equals Handle::INVALID.
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            capacity,
        }
    }

    /// Take ownership of `value` and return its handle, or `None` when the
    /// pool is full.
    pub fn allocate(&mut self, value: T) -> Option<Handle<T>> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
            None => {
                debug!(capacity = self.capacity, "Object pool is full");
                return None;
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        Some(Handle::from_parts(index, slot.generation))
    }

    /// Give the object back to the caller and free its slot. Returns `None`
    /// for a stale or foreign handle.
    pub fn release(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(handle.index());
        value
    }

    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        self.slot(handle).is_some()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slot(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    /// Borrow two distinct objects mutably at once. Returns `None` if either
    /// handle is invalid or both name the same object.
    pub fn get_pair_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        if !self.is_valid(a) || !self.is_valid(b) || a.index() == b.index() {
            return None;
        }
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        let (first, second) = if ia < ib {
            let (head, tail) = self.slots.split_at_mut(ib);
            (&mut head[ia], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(ia);
            (&mut tail[0], &mut head[ib])
        };
        Some((first.value.as_mut()?, second.value.as_mut()?))
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, handle: Handle<T>) -> Option<&Slot<T>> {
        let slot = self.slots.get(handle.index() as usize)?;
        (slot.generation % 2 == 1 && slot.generation == handle.generation()).then_some(slot)
    }

    fn slot_mut(&mut self, handle: Handle<T>) -> Option<&mut Slot<T>> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        (slot.generation % 2 == 1 && slot.generation == handle.generation()).then_some(slot)
    }
}
