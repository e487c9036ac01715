//! Event kinds delivered to the caller's event callback.

use serde::{Deserialize, Serialize};

/// Kind of a decoder event. Values match the public C header.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Reserved for log forwarding; never generated by the decoder.
    Log = 0,
    /// The decoder is shutting down. Always the last event delivered.
    Exit = 1,
    /// The base picture queue went from full to having space.
    CanSendBase = 2,
    /// The enhancement data queue went from full to having space.
    CanSendEnhancement = 3,
    /// The pending output picture queue went from full to having space.
    CanSendPicture = 4,
    /// A decode result is ready to be received.
    CanReceive = 5,
    /// A base picture has been consumed and can be received back.
    BasePictureDone = 6,
    /// An output picture has been handed to the caller.
    OutputPictureDone = 7,
}

impl EventKind {
    /// Number of event kinds.
    pub const COUNT: usize = 8;

    pub const ALL: [EventKind; Self::COUNT] = [
        Self::Log,
        Self::Exit,
        Self::CanSendBase,
        Self::CanSendEnhancement,
        Self::CanSendPicture,
        Self::CanReceive,
        Self::BasePictureDone,
        Self::OutputPictureDone,
    ];

    pub fn from_raw(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Bit of this kind in an enable mask.
    pub fn mask_bit(self) -> u16 {
        1 << (self as i32)
    }

    /// Build an enable mask from raw kind values, ignoring out-of-range ones.
    pub fn mask_from_raw(kinds: &[i32]) -> u16 {
        kinds
            .iter()
            .filter_map(|&raw| Self::from_raw(raw))
            .fold(0, |mask, kind| mask | kind.mask_bit())
    }
}
