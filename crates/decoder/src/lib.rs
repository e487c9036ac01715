//! Decode orchestration for LCEVC enhanced video.
//!
//! The crate sits between an application and an LCEVC core engine. It takes
//! base pictures, enhancement data and output pictures on three independent
//! lanes, matches them by [`Timehandle`](lcevc_common::Timehandle), and
//! produces enhanced pictures (or passes the base through when enhancement
//! is missing or late). The engine itself is abstracted behind the
//! [`CoreDecoder`] trait.
//!
//! - [`registry`]: the public API, addressed by [`DecoderHandle`]
//! - [`decoder`]: the per-decoder pipeline
//! - [`lcevc_processor`]: enhancement data buffering and temporal accumulation
//! - [`picture`], [`layout`], [`buffer_manager`]: picture memory
//! - [`event_dispatcher`]: asynchronous event delivery

pub mod buffer_manager;
pub mod core;
pub mod decoder;
pub mod event_dispatcher;
pub mod layout;
pub mod lcevc_processor;
pub mod logging;
pub mod picture;
pub mod pool;
pub mod registry;

// Re-export commonly used items at crate root
pub use crate::core::{CoreDecoder, CoreError, CoreImage, Loq, StreamDescriptor};
pub use decoder::{DecodeResult, Decoder, DecoderHandle, DecoderStats, PeekResult};
pub use event_dispatcher::{Event, EventCallback};
pub use picture::{BufferDesc, ExternalBuffer, Picture, PictureLock, PlaneDesc};
pub use registry::{default_picture_desc, DecoderRegistry};
