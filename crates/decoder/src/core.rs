//! Contract with the enhancement engine.
//!
//! The engine does the actual LCEVC work: parsing enhancement payloads,
//! applying residuals, upscaling and sharpening. The decoder only drives it
//! through [`CoreDecoder`], handing it [`CoreImage`] views of picture memory.

use std::fmt;

use lcevc_common::{DecoderConfig, PredictedAverageMethod};

// ---------------------------------------------------------------------------
// Stream description
// ---------------------------------------------------------------------------

/// Layer of quality. `Loq0` is the full-resolution output layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Loq {
    Loq0 = 0,
    Loq1 = 1,
    Loq2 = 2,
}

/// Upscaling applied between two layers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScalingMode {
    /// No upscaling.
    #[default]
    Scale0D,
    /// Horizontal only.
    Scale1D,
    /// Horizontal and vertical.
    Scale2D,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineMode {
    /// Residuals are applied in place on the base picture.
    #[default]
    Speed,
    /// Work happens on internal surfaces; the base is never written.
    Precision,
}

/// Where the sharpening filter runs, if at all.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SFilterMode {
    #[default]
    Disabled,
    InLoop,
    OutOfLoop,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CoreColorSpace {
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
    Monochrome,
}

/// Crop signalled in the enhancement stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConformanceWindow {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// Parsed enhancement payload for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamDescriptor {
    /// Output (LOQ0) width.
    pub global_width: u32,
    /// Output (LOQ0) height.
    pub global_height: u32,
    pub color_space: CoreColorSpace,
    /// Bit depth of LOQ0 and LOQ1 respectively.
    pub loq_bitdepths: [u8; 2],
    /// Whether residuals are present for LOQ0 and LOQ1 respectively.
    pub loq_enabled: [bool; 2],
    /// Upscaling into LOQ0 and into LOQ1 respectively.
    pub scaling_modes: [ScalingMode; 2],
    pub pipeline_mode: PipelineMode,
    pub s_filter_mode: SFilterMode,
    pub conformance_window: Option<ConformanceWindow>,
}

impl StreamDescriptor {
    pub fn loq_enabled(&self, loq: Loq) -> bool {
        self.loq_enabled.get(loq as usize).copied().unwrap_or(false)
    }

    pub fn scaling_mode(&self, loq: Loq) -> ScalingMode {
        self.scaling_modes.get(loq as usize).copied().unwrap_or_default()
    }

    /// Bit depth of the enhanced output.
    pub fn output_bitdepth(&self) -> u8 {
        self.loq_bitdepths[0]
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// How components are arranged in an image's planes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CoreInterleaving {
    /// One component per plane.
    None,
    /// Luma plane plus one interleaved chroma plane.
    Nv12,
    Rgb,
    Rgba,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CoreBitDepth {
    Depth8,
    Depth10,
    Depth12,
    Depth14,
    Depth16,
}

impl CoreBitDepth {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self::Depth8),
            10 => Some(Self::Depth10),
            12 => Some(Self::Depth12),
            14 => Some(Self::Depth14),
            16 => Some(Self::Depth16),
            _ => None,
        }
    }
}

/// One plane of picture memory lent to the engine.
pub struct CorePlane<'a> {
    pub data: &'a mut [u8],
    /// Row stride in samples.
    pub stride: u32,
}

/// View of a picture handed to the engine.
///
/// An image with no planes asks the engine to update its internal state
/// only, without writing pixels.
pub struct CoreImage<'a> {
    pub interleaving: CoreInterleaving,
    pub depth: CoreBitDepth,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<CorePlane<'a>>,
}

impl CoreImage<'static> {
    /// Image without memory, used to accumulate temporal state for frames
    /// that are skipped.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            interleaving: CoreInterleaving::None,
            depth: CoreBitDepth::Depth8,
            width,
            height,
            planes: Vec::new(),
        }
    }
}

impl CoreImage<'_> {
    pub fn has_memory(&self) -> bool {
        !self.planes.is_empty()
    }
}

impl fmt::Debug for CoreImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreImage")
            .field("interleaving", &self.interleaving)
            .field("depth", &self.depth)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("planes", &self.planes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Residual surface format set per frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    U8,
    S16,
}

impl SurfaceFormat {
    /// Surface format for a stream: the configured override if set
    /// (`0` for 8-bit, anything else 16-bit), otherwise 8-bit only when both
    /// enhanced layers are 8-bit.
    pub fn for_stream(stream: &StreamDescriptor, fp_setting: i32) -> Self {
        match fp_setting {
            -1 if stream.loq_bitdepths == [8, 8] => Self::U8,
            -1 => Self::S16,
            0 => Self::U8,
            _ => Self::S16,
        }
    }
}

/// Settings handed to [`CoreDecoder::open`].
#[derive(Clone, Debug, PartialEq)]
pub struct CoreConfig {
    pub pipeline_mode: PipelineMode,
    /// `None` lets the engine pick.
    pub worker_threads: Option<u32>,
    pub parallel_decode: bool,
    pub generate_cmdbuffers: bool,
    pub simd: bool,
    pub dithering: bool,
    pub dither_seed: i32,
    pub dither_strength: i32,
    pub logo_overlay: bool,
    pub logo_overlay_delay: Option<u16>,
    pub logo_overlay_position: (Option<u16>, Option<u16>),
    /// `None` uses the strength signalled in the stream.
    pub s_filter_strength: Option<f32>,
    pub approximate_predicted_average: bool,
    pub highlight_residuals: bool,
}

fn positive_u16(value: i32) -> Option<u16> {
    u16::try_from(value).ok().filter(|&v| v > 0)
}

impl From<&DecoderConfig> for CoreConfig {
    fn from(cfg: &DecoderConfig) -> Self {
        Self {
            pipeline_mode: if cfg.high_precision {
                PipelineMode::Precision
            } else {
                PipelineMode::Speed
            },
            worker_threads: u32::try_from(cfg.core_threads).ok(),
            parallel_decode: cfg.parallel_decode,
            generate_cmdbuffers: cfg.generate_cmdbuffers,
            simd: !cfg.disable_simd,
            dithering: cfg.allow_dithering,
            dither_seed: cfg.dither_seed,
            dither_strength: cfg.dither_strength,
            logo_overlay: cfg.enable_logo_overlay,
            logo_overlay_delay: positive_u16(cfg.logo_overlay_delay_frames),
            logo_overlay_position: (
                positive_u16(cfg.logo_overlay_position_x),
                positive_u16(cfg.logo_overlay_position_y),
            ),
            s_filter_strength: (cfg.s_filter_strength >= 0.0).then_some(cfg.s_filter_strength),
            approximate_predicted_average: cfg.predicted_average()
                == PredictedAverageMethod::BakedIntoKernel,
            highlight_residuals: cfg.highlight_residuals,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

/// Failure reported by the engine. The decoder treats every failure of a
/// call as fatal for the frame being decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {reason}")]
pub struct CoreError {
    pub operation: &'static str,
    pub reason: String,
}

impl CoreError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// The enhancement engine.
pub trait CoreDecoder {
    fn open(&mut self, config: &CoreConfig) -> CoreResult<()>;

    fn close(&mut self);

    /// Parse one enhancement payload.
    fn parse(&mut self, data: &[u8]) -> CoreResult<StreamDescriptor>;

    /// Apply base-layer (LOQ1) residuals to `image` in place.
    fn decode_base(&mut self, image: &mut CoreImage<'_>) -> CoreResult<()>;

    /// Upscale `src` into `dst` for the given layer.
    fn upscale(&mut self, dst: &mut CoreImage<'_>, src: &CoreImage<'_>, loq: Loq) -> CoreResult<()>;

    /// Apply full-resolution (LOQ0) residuals to `image`. An image without
    /// memory only accumulates temporal state.
    fn decode_high(&mut self, image: &mut CoreImage<'_>) -> CoreResult<()>;

    /// Run the sharpening filter over `image`.
    fn apply_filter(&mut self, image: &mut CoreImage<'_>) -> CoreResult<()>;

    fn set_live_config(&mut self, format: SurfaceFormat) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_follows_layer_depths() {
        let mut stream = StreamDescriptor {
            loq_bitdepths: [8, 8],
            ..Default::default()
        };
        assert_eq!(SurfaceFormat::for_stream(&stream, -1), SurfaceFormat::U8);
        stream.loq_bitdepths = [10, 8];
        assert_eq!(SurfaceFormat::for_stream(&stream, -1), SurfaceFormat::S16);
        assert_eq!(SurfaceFormat::for_stream(&stream, 0), SurfaceFormat::U8);
        stream.loq_bitdepths = [8, 8];
        assert_eq!(SurfaceFormat::for_stream(&stream, 1), SurfaceFormat::S16);
    }

    #[test]
    fn core_config_from_defaults() {
        let core = CoreConfig::from(&DecoderConfig::default());
        assert_eq!(core.pipeline_mode, PipelineMode::Speed);
        assert_eq!(core.worker_threads, None);
        assert_eq!(core.s_filter_strength, None);
        assert_eq!(core.logo_overlay_delay, None);
        assert!(core.simd);
        assert!(core.dithering);
        assert!(!core.approximate_predicted_average);
    }

    #[test]
    fn core_config_overrides() {
        let mut cfg = DecoderConfig::default();
        cfg.high_precision = true;
        cfg.core_threads = 3;
        cfg.s_filter_strength = 0.0;
        cfg.predicted_average_method = PredictedAverageMethod::BakedIntoKernel as i32;
        cfg.logo_overlay_position_x = 12;
        let core = CoreConfig::from(&cfg);
        assert_eq!(core.pipeline_mode, PipelineMode::Precision);
        assert_eq!(core.worker_threads, Some(3));
        assert_eq!(core.s_filter_strength, Some(0.0));
        assert!(core.approximate_predicted_average);
        assert_eq!(core.logo_overlay_position, (Some(12), None));
    }

    #[test]
    fn missing_layers_read_as_disabled() {
        let stream = StreamDescriptor::default();
        assert!(!stream.loq_enabled(Loq::Loq2));
        assert_eq!(stream.scaling_mode(Loq::Loq2), ScalingMode::Scale0D);
    }
}
