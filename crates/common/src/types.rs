//! Identity and decode-result value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque caller token attached to base pictures and echoed back in
/// [`DecodeInformation`]. The decoder never interprets it.
pub type UserData = u64;

// ---------------------------------------------------------------------------
// Timehandle
// ---------------------------------------------------------------------------

/// Composite frame identity: a 16-bit discontinuity count and a signed
/// presentation timestamp, packed into one totally ordered `u64`.
///
/// Layout: the discontinuity count occupies the top 16 bits, the timestamp
/// the low 48 bits. The timestamp is stored with a bias of 2^47 so that
/// negative timestamps sort before positive ones inside the same
/// continuity segment. Timestamps outside `[-2^47, 2^47)` wrap.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timehandle(u64);

impl Timehandle {
    /// Sentinel that never identifies a frame.
    pub const INVALID: Self = Self(u64::MAX);

    const TIMESTAMP_BITS: u32 = 48;
    const TIMESTAMP_MASK: u64 = (1u64 << Self::TIMESTAMP_BITS) - 1;
    const TIMESTAMP_BIAS: i64 = 1i64 << (Self::TIMESTAMP_BITS - 1);

    /// Pack a discontinuity count and a timestamp.
    pub fn new(discontinuity_count: u16, timestamp: i64) -> Self {
        let biased = (timestamp.wrapping_add(Self::TIMESTAMP_BIAS) as u64) & Self::TIMESTAMP_MASK;
        Self((u64::from(discontinuity_count) << Self::TIMESTAMP_BITS) | biased)
    }

    /// Rebuild from the packed representation.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The packed representation.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Discontinuity count ("cc") of the continuity segment.
    pub fn cc(self) -> u16 {
        (self.0 >> Self::TIMESTAMP_BITS) as u16
    }

    /// Presentation timestamp.
    pub fn timestamp(self) -> i64 {
        ((self.0 & Self::TIMESTAMP_MASK) as i64) - Self::TIMESTAMP_BIAS
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for Timehandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Timehandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.debug_struct("Timehandle")
                .field("cc", &self.cc())
                .field("pts", &self.timestamp())
                .finish()
        } else {
            f.write_str("Timehandle(INVALID)")
        }
    }
}

impl fmt::Display for Timehandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "CC {} PTS {}", self.cc(), self.timestamp())
        } else {
            f.write_str("CC - PTS -")
        }
    }
}

/// Pick the more recent of two discontinuity counts, treating the 16-bit
/// counter as a serial number (RFC 1982 style) so that a counter which has
/// wrapped from `u16::MAX` to `0` still compares as newer.
pub fn latest_discontinuity(a: u16, b: u16) -> u16 {
    if (b.wrapping_sub(a) as i16) > 0 {
        b
    } else {
        a
    }
}

// ---------------------------------------------------------------------------
// Decode information
// ---------------------------------------------------------------------------

/// Properties of the decode performed for one timestamp.
///
/// Populated for every result, including failed ones, so that a caller can
/// always tell which frame a result belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeInformation {
    /// Presentation timestamp of the picture.
    pub timestamp: i64,
    /// A base picture was available.
    pub has_base: bool,
    /// Enhancement data was available.
    pub has_enhancement: bool,
    /// A skip was requested covering this timestamp.
    pub skipped: bool,
    /// The output was produced by running the enhancement engine.
    pub enhanced: bool,
    /// Width of the base picture (post-crop).
    pub base_width: u32,
    /// Height of the base picture (post-crop).
    pub base_height: u32,
    /// Bit depth of the base picture.
    pub base_bitdepth: u8,
    /// Caller token that arrived with the base picture.
    pub base_user_data: UserData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timehandle_round_trips_fields() {
        let th = Timehandle::new(7, 123_456);
        assert_eq!(th.cc(), 7);
        assert_eq!(th.timestamp(), 123_456);
        assert!(th.is_valid());
    }

    #[test]
    fn negative_timestamps_sort_first() {
        let neg = Timehandle::new(0, -40);
        let zero = Timehandle::new(0, 0);
        let pos = Timehandle::new(0, 40);
        assert!(neg < zero && zero < pos);
        assert_eq!(neg.timestamp(), -40);
    }

    #[test]
    fn discontinuity_count_dominates_timestamp() {
        let late_old_segment = Timehandle::new(1, 1_000_000);
        let early_new_segment = Timehandle::new(2, 0);
        assert!(late_old_segment < early_new_segment);
    }

    #[test]
    fn same_timestamp_different_segment_never_collides() {
        assert_ne!(Timehandle::new(0, 33), Timehandle::new(1, 33));
    }

    #[test]
    fn invalid_is_greatest_and_default() {
        assert!(!Timehandle::INVALID.is_valid());
        assert!(Timehandle::new(u16::MAX - 1, 0) < Timehandle::INVALID);
        assert_eq!(Timehandle::default(), Timehandle::INVALID);
    }

    #[test]
    fn latest_discontinuity_handles_wrap() {
        assert_eq!(latest_discontinuity(3, 5), 5);
        assert_eq!(latest_discontinuity(5, 3), 5);
        assert_eq!(latest_discontinuity(4, 4), 4);
        // 0 follows 65535 after a wrap.
        assert_eq!(latest_discontinuity(u16::MAX, 0), 0);
        assert_eq!(latest_discontinuity(0, u16::MAX), 0);
    }

    #[test]
    fn display_shows_cc_and_pts() {
        assert_eq!(Timehandle::new(2, -5).to_string(), "CC 2 PTS -5");
    }
}
