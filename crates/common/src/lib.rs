//! Shared types, return codes, errors and configuration for the
//! LCEVC decoder API.
//!
//! This crate is the foundation the decoder crate builds on. It defines:
//!
//! - **Identity**: [`Timehandle`] (discontinuity count + presentation timestamp)
//! - **Handles**: [`Handle`], a generation-stamped opaque reference into an object pool
//! - **Pictures**: [`PictureDesc`], [`ColorFormat`], colour metadata, [`Access`], [`PictureFlag`]
//! - **Decode results**: [`DecodeInformation`], [`EventKind`]
//! - **Errors**: [`ReturnCode`], [`DecoderError`], [`ConfigError`] (thiserror-based)
//! - **Config**: [`DecoderConfig`], [`ConfigValue`], [`PassthroughPolicy`]

pub mod color;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod picture;
pub mod types;

// Re-export commonly used items at crate root
pub use color::{
    ColorFormat, ColorPrimaries, ColorRange, HdrStaticInfo, MatrixCoefficients,
    TransferCharacteristics,
};
pub use config::{
    ConfigValue, DecoderConfig, LogComponent, LogLevel, PassthroughPolicy, PredictedAverageMethod,
};
pub use error::{ConfigError, DecoderError, DecoderResult, ReturnCode};
pub use event::EventKind;
pub use handle::Handle;
pub use picture::{Access, PictureDesc, PictureFlag};
pub use types::{latest_discontinuity, DecodeInformation, Timehandle, UserData};
