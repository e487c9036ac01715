//! Typed, generation-stamped handles.
//!
//! A handle packs a slot index (high 32 bits) and that slot's generation
//! (low 32 bits) into one opaque `u64`. Handles are plain values: they carry
//! no ownership, and a stale handle is detected by the owning pool when the
//! generation no longer matches.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque reference to an object of type `T` held in an object pool.
pub struct Handle<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The all-ones handle, never issued by a pool.
    pub const INVALID: Self = Self::from_raw(u64::MAX);

    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self::from_raw(((index as u64) << 32) | generation as u64)
    }

    pub const fn raw(self) -> u64 {
        self.raw
    }

    pub const fn index(self) -> u32 {
        (self.raw >> 32) as u32
    }

    pub const fn generation(self) -> u32 {
        self.raw as u32
    }

    pub fn is_invalid(self) -> bool {
        self.raw == u64::MAX
    }
}

// Manual impls: derives would needlessly require `T: Clone` etc.

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            f.write_str("Handle(INVALID)")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}
