//! Colour formats and colour metadata carried by pictures.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Color format
// ---------------------------------------------------------------------------

/// Pixel layout of a picture. Values match the public C header.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    #[default]
    Unknown = 0,

    I420_8 = 1001,
    I420_10LE = 1002,
    I420_12LE = 1003,
    I420_14LE = 1004,
    I420_16LE = 1005,

    I422_8 = 1201,
    I422_10LE = 1202,
    I422_12LE = 1203,
    I422_14LE = 1204,
    I422_16LE = 1205,

    I444_8 = 1401,
    I444_10LE = 1402,
    I444_12LE = 1403,
    I444_14LE = 1404,
    I444_16LE = 1405,

    Nv12_8 = 2001,
    Nv21_8 = 2002,

    Rgb8 = 3001,
    Bgr8 = 3002,
    Rgba8 = 3003,
    Bgra8 = 3004,
    Argb8 = 3005,
    Abgr8 = 3006,

    Rgba10_2LE = 4001,

    Gray8 = 5001,
    Gray10LE = 5002,
    Gray12LE = 5003,
    Gray14LE = 5004,
    Gray16LE = 5005,
}

/// Broad family of a [`ColorFormat`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorFamily {
    /// Y, U and V on separate planes.
    YuvPlanar,
    /// Y plane plus one interleaved chroma plane.
    YuvSemiPlanar,
    /// Single interleaved RGB(A) plane.
    Rgb,
    /// Luma only.
    Gray,
}

impl ColorFormat {
    /// Every format, `Unknown` last.
    pub const ALL: [ColorFormat; 30] = [
        Self::I420_8,
        Self::I420_10LE,
        Self::I420_12LE,
        Self::I420_14LE,
        Self::I420_16LE,
        Self::I422_8,
        Self::I422_10LE,
        Self::I422_12LE,
        Self::I422_14LE,
        Self::I422_16LE,
        Self::I444_8,
        Self::I444_10LE,
        Self::I444_12LE,
        Self::I444_14LE,
        Self::I444_16LE,
        Self::Nv12_8,
        Self::Nv21_8,
        Self::Rgb8,
        Self::Bgr8,
        Self::Rgba8,
        Self::Bgra8,
        Self::Argb8,
        Self::Abgr8,
        Self::Rgba10_2LE,
        Self::Gray8,
        Self::Gray10LE,
        Self::Gray12LE,
        Self::Gray14LE,
        Self::Gray16LE,
        Self::Unknown,
    ];

    pub fn from_raw(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| *f as u32 == value)
    }

    pub fn family(self) -> Option<ColorFamily> {
        use ColorFormat::*;
        match self {
            Unknown => None,
            I420_8 | I420_10LE | I420_12LE | I420_14LE | I420_16LE | I422_8 | I422_10LE
            | I422_12LE | I422_14LE | I422_16LE | I444_8 | I444_10LE | I444_12LE
            | I444_14LE | I444_16LE => Some(ColorFamily::YuvPlanar),
            Nv12_8 | Nv21_8 => Some(ColorFamily::YuvSemiPlanar),
            Rgb8 | Bgr8 | Rgba8 | Bgra8 | Argb8 | Abgr8 | Rgba10_2LE => Some(ColorFamily::Rgb),
            Gray8 | Gray10LE | Gray12LE | Gray14LE | Gray16LE => Some(ColorFamily::Gray),
        }
    }

    /// Significant bits per sample (0 for `Unknown`).
    pub fn bit_depth(self) -> u8 {
        use ColorFormat::*;
        match self {
            Unknown => 0,
            I420_8 | I422_8 | I444_8 | Nv12_8 | Nv21_8 | Rgb8 | Bgr8 | Rgba8 | Bgra8 | Argb8
            | Abgr8 | Gray8 => 8,
            I420_10LE | I422_10LE | I444_10LE | Rgba10_2LE | Gray10LE => 10,
            I420_12LE | I422_12LE | I444_12LE | Gray12LE => 12,
            I420_14LE | I422_14LE | I444_14LE | Gray14LE => 14,
            I420_16LE | I422_16LE | I444_16LE | Gray16LE => 16,
        }
    }

    /// Planar 4:2:0 format with the given bit depth, if one exists.
    pub fn i420_with_depth(bit_depth: u8) -> Option<Self> {
        match bit_depth {
            8 => Some(Self::I420_8),
            10 => Some(Self::I420_10LE),
            12 => Some(Self::I420_12LE),
            14 => Some(Self::I420_14LE),
            16 => Some(Self::I420_16LE),
            _ => None,
        }
    }

    /// Whether any plane carries more than one component per pixel.
    pub fn is_interleaved(self) -> bool {
        matches!(
            self.family(),
            Some(ColorFamily::YuvSemiPlanar) | Some(ColorFamily::Rgb)
        )
    }
}

// ---------------------------------------------------------------------------
// Colour metadata
// ---------------------------------------------------------------------------

#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorRange {
    #[default]
    Unknown = 0,
    /// 0..255 for 8-bit content.
    Full = 1,
    /// 16..235 luma, 16..240 chroma for 8-bit content.
    Limited = 2,
}

/// Colour primaries (ITU-T H.273 code points).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorPrimaries {
    Reserved0 = 0,
    Bt709 = 1,
    #[default]
    Unspecified = 2,
    Bt470M = 4,
    Bt470Bg = 5,
    Bt601Ntsc = 6,
    Smpte240 = 7,
    GenericFilm = 8,
    Bt2020 = 9,
    Xyz = 10,
    Smpte431 = 11,
    Smpte432 = 12,
    P22 = 22,
}

/// Transfer characteristics (ITU-T H.273 code points).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferCharacteristics {
    Reserved0 = 0,
    Bt709 = 1,
    #[default]
    Unspecified = 2,
    Gamma22 = 4,
    Gamma28 = 5,
    Bt601 = 6,
    Smpte240 = 7,
    Linear = 8,
    Log100 = 9,
    Log100Sqrt10 = 10,
    Iec61966 = 11,
    Bt1361 = 12,
    SrgbSycc = 13,
    Bt2020_10Bit = 14,
    Bt2020_12Bit = 15,
    Pq = 16,
    Smpte428 = 17,
    Hlg = 18,
}

/// Matrix coefficients (ITU-T H.273 code points).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixCoefficients {
    Identity = 0,
    Bt709 = 1,
    #[default]
    Unspecified = 2,
    Usfcc = 4,
    Bt470Bg = 5,
    Bt601Ntsc = 6,
    Smpte240 = 7,
    YCgCo = 8,
    Bt2020Ncl = 9,
    Bt2020Cl = 10,
    Smpte2085 = 11,
    ChromaticityNcl = 12,
    ChromaticityCl = 13,
    ICtCp = 14,
}

/// Mastering display and content light level metadata (SMPTE ST 2086 /
/// CTA-861.3). Chromaticities are in units of 0.00002.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HdrStaticInfo {
    pub display_primaries_x: [u16; 3],
    pub display_primaries_y: [u16; 3],
    pub white_point_x: u16,
    pub white_point_y: u16,
    /// Units of 1 cd/m2.
    pub max_display_mastering_luminance: u16,
    /// Units of 0.0001 cd/m2.
    pub min_display_mastering_luminance: u16,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}
