//! Picture description and access types shared by the decoder and callers.

use serde::{Deserialize, Serialize};

use crate::color::{
    ColorFormat, ColorPrimaries, ColorRange, HdrStaticInfo, MatrixCoefficients,
    TransferCharacteristics,
};

/// Format, geometry and colour metadata of a picture.
///
/// `width` and `height` are the visible (post-crop) dimensions; the crop
/// margins describe how much of the stored picture lies outside them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PictureDesc {
    pub color_format: ColorFormat,
    pub width: u32,
    pub height: u32,

    pub color_range: ColorRange,
    pub color_primaries: ColorPrimaries,
    pub matrix_coefficients: MatrixCoefficients,
    pub transfer_characteristics: TransferCharacteristics,
    pub hdr_static_info: HdrStaticInfo,

    /// Sample aspect ratio numerator (1 for square pixels).
    pub sample_aspect_ratio_num: u32,
    /// Sample aspect ratio denominator (1 for square pixels).
    pub sample_aspect_ratio_den: u32,

    pub crop_top: u32,
    pub crop_bottom: u32,
    pub crop_left: u32,
    pub crop_right: u32,
}

impl PictureDesc {
    /// Default description for a format and size: unspecified colour
    /// metadata, square pixels, no crop.
    pub fn new(color_format: ColorFormat, width: u32, height: u32) -> Self {
        Self {
            color_format,
            width,
            height,
            sample_aspect_ratio_num: 1,
            sample_aspect_ratio_den: 1,
            ..Self::default()
        }
    }

    /// Whether the crop margins fit inside the picture.
    pub fn crop_is_valid(&self) -> bool {
        let horizontal = u64::from(self.crop_left) + u64::from(self.crop_right);
        let vertical = u64::from(self.crop_top) + u64::from(self.crop_bottom);
        horizontal <= u64::from(self.width) && vertical <= u64::from(self.height)
    }

    pub fn bit_depth(&self) -> u8 {
        self.color_format.bit_depth()
    }
}

/// Level of access requested when locking a picture.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    #[default]
    Unknown = 0,
    /// Read-only.
    Read = 1,
    /// Read and write; existing contents are preserved.
    Modify = 2,
    /// Write only; existing contents may be discarded.
    Write = 3,
}

impl Access {
    pub fn allows_write(self) -> bool {
        matches!(self, Self::Modify | Self::Write)
    }
}

/// Per-picture boolean flags.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PictureFlag {
    Unknown = 0,
    /// Instantaneous decoder refresh picture.
    Idr = 1,
    /// Interlaced content.
    Interlaced = 2,
}

impl PictureFlag {
    /// Bit used to store the flag, or `None` for `Unknown`.
    pub fn bit(self) -> Option<u8> {
        match self {
            Self::Unknown => None,
            Self::Idr => Some(1 << 0),
            Self::Interlaced => Some(1 << 1),
        }
    }
}
