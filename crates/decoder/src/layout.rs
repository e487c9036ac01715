//! Memory layout of a picture: plane count, subsampling, strides and sizes.
//!
//! Planes are stored back to back in one buffer, in plane order, each
//! `row_stride * plane_height` bytes long. Default strides are unpadded.

use lcevc_common::ColorFormat;

/// Most planes any supported format uses.
pub const MAX_PLANES: usize = 3;

#[derive(Clone, Copy, Debug)]
struct FormatInfo {
    planes: usize,
    width_shift: [u8; MAX_PLANES],
    height_shift: [u8; MAX_PLANES],
    /// Samples per pixel in each plane (2 for interleaved chroma).
    components: [u8; MAX_PLANES],
    sample_size: u8,
}

fn format_info(format: ColorFormat) -> Option<FormatInfo> {
    use ColorFormat::*;

    let depth_bytes = if format.bit_depth() > 8 { 2 } else { 1 };
    let info = match format {
        Unknown => return None,
        I420_8 | I420_10LE | I420_12LE | I420_14LE | I420_16LE => FormatInfo {
            planes: 3,
            width_shift: [0, 1, 1],
            height_shift: [0, 1, 1],
            components: [1, 1, 1],
            sample_size: depth_bytes,
        },
        I422_8 | I422_10LE | I422_12LE | I422_14LE | I422_16LE => FormatInfo {
            planes: 3,
            width_shift: [0, 1, 1],
            height_shift: [0, 0, 0],
            components: [1, 1, 1],
            sample_size: depth_bytes,
        },
        I444_8 | I444_10LE | I444_12LE | I444_14LE | I444_16LE => FormatInfo {
            planes: 3,
            width_shift: [0, 0, 0],
            height_shift: [0, 0, 0],
            components: [1, 1, 1],
            sample_size: depth_bytes,
        },
        Nv12_8 | Nv21_8 => FormatInfo {
            planes: 2,
            width_shift: [0, 1, 0],
            height_shift: [0, 1, 0],
            components: [1, 2, 0],
            sample_size: 1,
        },
        Rgb8 | Bgr8 => FormatInfo {
            planes: 1,
            width_shift: [0; MAX_PLANES],
            height_shift: [0; MAX_PLANES],
            components: [3, 0, 0],
            sample_size: 1,
        },
        Rgba8 | Bgra8 | Argb8 | Abgr8 => FormatInfo {
            planes: 1,
            width_shift: [0; MAX_PLANES],
            height_shift: [0; MAX_PLANES],
            components: [4, 0, 0],
            sample_size: 1,
        },
        // One packed 32-bit word per pixel.
        Rgba10_2LE => FormatInfo {
            planes: 1,
            width_shift: [0; MAX_PLANES],
            height_shift: [0; MAX_PLANES],
            components: [1, 0, 0],
            sample_size: 4,
        },
        Gray8 | Gray10LE | Gray12LE | Gray14LE | Gray16LE => FormatInfo {
            planes: 1,
            width_shift: [0; MAX_PLANES],
            height_shift: [0; MAX_PLANES],
            components: [1, 0, 0],
            sample_size: depth_bytes,
        },
    };
    Some(info)
}

fn shifted(value: u32, shift: u8) -> u32 {
    // Round up so odd sizes keep their last chroma sample.
    ((u64::from(value) + (1u64 << shift) - 1) >> shift) as u32
}

/// Layout of a picture of a given format and (uncropped) size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PictureLayout {
    format: ColorFormat,
    width: u32,
    height: u32,
    row_strides: [u32; MAX_PLANES],
}

impl Default for PictureLayout {
    fn default() -> Self {
        Self::new(ColorFormat::Unknown, 0, 0)
    }
}

impl PictureLayout {
    /// Layout with default (unpadded) strides. An `Unknown` format gives a
    /// layout with no planes.
    pub fn new(format: ColorFormat, width: u32, height: u32) -> Self {
        let mut layout = Self {
            format,
            width,
            height,
            row_strides: [0; MAX_PLANES],
        };
        for plane in 0..layout.plane_count() {
            layout.row_strides[plane] = layout.default_row_stride(plane);
        }
        layout
    }

    /// Layout with caller-chosen strides. Returns `None` if any stride is
    /// shorter than a row, or fewer strides than planes are given.
    pub fn with_strides(format: ColorFormat, width: u32, height: u32, strides: &[u32]) -> Option<Self> {
        let mut layout = Self::new(format, width, height);
        for plane in 0..layout.plane_count() {
            let stride = *strides.get(plane)?;
            if stride < layout.default_row_stride(plane) {
                return None;
            }
            layout.row_strides[plane] = stride;
        }
        Some(layout)
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane_count(&self) -> usize {
        format_info(self.format).map_or(0, |info| info.planes)
    }

    /// Bytes per sample.
    pub fn sample_size(&self) -> u32 {
        format_info(self.format).map_or(0, |info| u32::from(info.sample_size))
    }

    pub fn bit_depth(&self) -> u8 {
        self.format.bit_depth()
    }

    pub fn is_interleaved(&self) -> bool {
        self.format.is_interleaved()
    }

    /// Samples per pixel in `plane`.
    pub fn components(&self, plane: usize) -> u32 {
        format_info(self.format).map_or(0, |info| u32::from(info.components[plane]))
    }

    /// Width of `plane` in pixels.
    pub fn plane_width(&self, plane: usize) -> u32 {
        format_info(self.format).map_or(0, |info| shifted(self.width, info.width_shift[plane]))
    }

    /// Height of `plane` in rows.
    pub fn plane_height(&self, plane: usize) -> u32 {
        format_info(self.format).map_or(0, |info| shifted(self.height, info.height_shift[plane]))
    }

    /// Bytes of pixel data in one row of `plane`, excluding padding.
    pub fn row_bytes(&self, plane: usize) -> u32 {
        self.plane_width(plane) * self.components(plane) * self.sample_size()
    }

    pub fn default_row_stride(&self, plane: usize) -> u32 {
        self.row_bytes(plane)
    }

    /// Bytes from the start of one row of `plane` to the next.
    pub fn row_stride(&self, plane: usize) -> u32 {
        self.row_strides[plane]
    }

    /// Row stride of `plane` in samples.
    pub fn sample_stride(&self, plane: usize) -> u32 {
        match self.sample_size() {
            0 => 0,
            size => self.row_strides[plane] / size,
        }
    }

    /// Bytes occupied by `plane`, including padding.
    pub fn plane_size(&self, plane: usize) -> usize {
        self.row_strides[plane] as usize * self.plane_height(plane) as usize
    }

    /// Offset of `plane` from the start of a tightly packed buffer.
    pub fn plane_offset(&self, plane: usize) -> usize {
        (0..plane).map(|p| self.plane_size(p)).sum()
    }

    /// Bytes needed to store every plane back to back.
    pub fn total_size(&self) -> usize {
        (0..self.plane_count()).map(|p| self.plane_size(p)).sum()
    }
}
