//! Shared harness for the integration tests: a scripted engine and helpers
//! to drive a decoder through the registry.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use lcevc_common::{Access, ColorFormat, EventKind, Handle, PictureDesc};
use lcevc_decoder::core::{
    CoreConfig, CoreDecoder, CoreError, CoreImage, CoreResult, Loq, ScalingMode, StreamDescriptor,
    SurfaceFormat,
};
use lcevc_decoder::{DecoderHandle, DecoderRegistry, Event, Picture};
use parking_lot::Mutex;
use serde_json::Value;

/// Value the mock writes over the luma plane of every decoded top layer.
pub const ENHANCED_LUMA: u8 = 0xAB;

pub const BASE_WIDTH: u32 = 4;
pub const BASE_HEIGHT: u32 = 4;

/// One engine call, as seen by the mock.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Open,
    Close,
    Parse(Vec<u8>),
    SetLiveConfig(SurfaceFormat),
    DecodeBase { width: u32, height: u32 },
    Upscale { loq: Loq, from: (u32, u32), to: (u32, u32) },
    DecodeHigh { width: u32, height: u32, with_memory: bool },
    ApplyFilter,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    fail_parse: bool,
    fail_decode_base: bool,
}

/// Engine double. Payloads are four bytes: output width then height, each
/// little-endian `u16`. Clones share their recorded calls.
#[derive(Clone, Default)]
pub struct MockCore {
    state: Arc<Mutex<MockState>>,
}

impl MockCore {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_fail_parse(&self, fail: bool) {
        self.state.lock().fail_parse = fail;
    }

    pub fn set_fail_decode_base(&self, fail: bool) {
        self.state.lock().fail_decode_base = fail;
    }

    /// Top-layer decodes made without an output image.
    pub fn temporal_only_decodes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::DecodeHigh { with_memory: false, .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

/// Enhancement payload for an output of `width` x `height`.
pub fn payload(width: u16, height: u16) -> Vec<u8> {
    let mut data = width.to_le_bytes().to_vec();
    data.extend_from_slice(&height.to_le_bytes());
    data
}

impl CoreDecoder for MockCore {
    fn open(&mut self, _config: &CoreConfig) -> CoreResult<()> {
        self.record(Call::Open);
        Ok(())
    }

    fn close(&mut self) {
        self.record(Call::Close);
    }

    fn parse(&mut self, data: &[u8]) -> CoreResult<StreamDescriptor> {
        self.record(Call::Parse(data.to_vec()));
        if self.state.lock().fail_parse {
            return Err(CoreError::new("parse", "scripted failure"));
        }
        let [w0, w1, h0, h1] = data else {
            return Err(CoreError::new("parse", "payload must be four bytes"));
        };
        Ok(StreamDescriptor {
            global_width: u32::from(u16::from_le_bytes([*w0, *w1])),
            global_height: u32::from(u16::from_le_bytes([*h0, *h1])),
            loq_bitdepths: [8, 8],
            scaling_modes: [ScalingMode::Scale2D, ScalingMode::Scale0D],
            ..StreamDescriptor::default()
        })
    }

    fn decode_base(&mut self, image: &mut CoreImage<'_>) -> CoreResult<()> {
        self.record(Call::DecodeBase {
            width: image.width,
            height: image.height,
        });
        if self.state.lock().fail_decode_base {
            return Err(CoreError::new("decode_base", "scripted failure"));
        }
        Ok(())
    }

    fn upscale(&mut self, dst: &mut CoreImage<'_>, src: &CoreImage<'_>, loq: Loq) -> CoreResult<()> {
        self.record(Call::Upscale {
            loq,
            from: (src.width, src.height),
            to: (dst.width, dst.height),
        });
        Ok(())
    }

    fn decode_high(&mut self, image: &mut CoreImage<'_>) -> CoreResult<()> {
        self.record(Call::DecodeHigh {
            width: image.width,
            height: image.height,
            with_memory: image.has_memory(),
        });
        if let Some(luma) = image.planes.first_mut() {
            luma.data.fill(ENHANCED_LUMA);
        }
        Ok(())
    }

    fn apply_filter(&mut self, _image: &mut CoreImage<'_>) -> CoreResult<()> {
        self.record(Call::ApplyFilter);
        Ok(())
    }

    fn set_live_config(&mut self, format: SurfaceFormat) -> CoreResult<()> {
        self.record(Call::SetLiveConfig(format));
        Ok(())
    }
}

/// Every event kind except `Log`, which is never generated.
pub fn all_events() -> Value {
    serde_json::json!([1, 2, 3, 4, 5, 6, 7])
}

/// A registry with one decoder, configured from `config` and initialised,
/// whose events are forwarded to `events`.
pub struct Harness {
    pub registry: DecoderRegistry,
    pub decoder: DecoderHandle,
    pub core: MockCore,
    pub events: Receiver<EventKind>,
}

impl Harness {
    pub fn new(config: Value) -> Self {
        let registry = DecoderRegistry::new();
        let core = MockCore::default();
        let decoder = registry
            .create_decoder(Box::new(core.clone()))
            .expect("create decoder");
        let rejected = registry
            .configure_from_json(decoder, &config)
            .expect("configure decoder");
        assert!(rejected.is_empty(), "rejected config keys: {rejected:?}");

        let (tx, events) = channel::unbounded();
        registry
            .set_event_callback(
                decoder,
                Some(Box::new(move |_, event: &Event| {
                    let _ = tx.send(event.kind);
                })),
            )
            .expect("set event callback");
        registry.initialize(decoder).expect("initialize decoder");

        Self {
            registry,
            decoder,
            core,
            events,
        }
    }

    /// A managed 8-bit I420 base picture with every byte set to `fill`.
    pub fn base_picture(&self, fill: u8) -> Handle<Picture> {
        let desc = PictureDesc::new(ColorFormat::I420_8, BASE_WIDTH, BASE_HEIGHT);
        let picture = self
            .registry
            .alloc_picture_managed(self.decoder, &desc)
            .expect("alloc base");
        let lock = self
            .registry
            .lock_picture(self.decoder, picture, Access::Write)
            .expect("lock base");
        let planes = self
            .registry
            .get_picture_plane_count(self.decoder, picture)
            .expect("plane count");
        for plane in 0..planes {
            self.registry
                .picture_lock_plane_mut(self.decoder, lock, plane, |data, _| data.fill(fill))
                .expect("fill plane");
        }
        self.registry
            .unlock_picture(self.decoder, lock)
            .expect("unlock base");
        picture
    }

    /// A managed output picture. Its description is replaced by the decode.
    pub fn output_picture(&self) -> Handle<Picture> {
        let desc = PictureDesc::new(ColorFormat::I420_8, BASE_WIDTH * 2, BASE_HEIGHT * 2);
        self.registry
            .alloc_picture_managed(self.decoder, &desc)
            .expect("alloc output")
    }

    /// Copy of one plane of `picture`, without row padding.
    pub fn plane_bytes(&self, picture: Handle<Picture>, plane: usize) -> Vec<u8> {
        let desc = self
            .registry
            .get_picture_desc(self.decoder, picture)
            .expect("picture desc");
        let lock = self
            .registry
            .lock_picture(self.decoder, picture, Access::Read)
            .expect("lock picture");
        let bytes = self
            .registry
            .picture_lock_plane(self.decoder, lock, plane, |data, stride| {
                let (width, height) = if plane == 0 {
                    (desc.width, desc.height)
                } else {
                    (desc.width.div_ceil(2), desc.height.div_ceil(2))
                };
                (0..height as usize)
                    .flat_map(|row| {
                        let start = row * stride as usize;
                        data[start..start + width as usize].to_vec()
                    })
                    .collect::<Vec<u8>>()
            })
            .expect("read plane");
        self.registry
            .unlock_picture(self.decoder, lock)
            .expect("unlock picture");
        bytes
    }

    /// Wait for the next `count` events.
    pub fn next_events(&self, count: usize) -> Vec<EventKind> {
        (0..count)
            .map(|_| {
                self.events
                    .recv_timeout(Duration::from_secs(5))
                    .expect("event not delivered in time")
            })
            .collect()
    }

    /// Destroy the decoder and return every event still undelivered. The
    /// dispatcher is joined on destroy, so nothing arrives afterwards.
    pub fn destroy(self) -> Vec<EventKind> {
        self.registry
            .destroy_decoder(self.decoder)
            .expect("destroy decoder");
        self.events.try_iter().collect()
    }
}
