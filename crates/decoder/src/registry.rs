//! Public decoder API.
//!
//! A [`DecoderRegistry`] owns every decoder the application creates and
//! hands out [`DecoderHandle`]s for them. The registry's own lock only covers
//! handle lookup; each decoder has its own lock, held for the whole of every
//! call on it, so separate decoders can be driven from separate threads.

use std::sync::Arc;

use lcevc_common::{
    Access, ColorFormat, ConfigValue, DecoderError, DecoderResult, Handle, PictureDesc,
    PictureFlag, UserData,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::core::CoreDecoder;
use crate::decoder::{DecodeResult, Decoder, DecoderHandle, DecoderStats, PeekResult};
use crate::event_dispatcher::EventCallback;
use crate::picture::{BufferDesc, ExternalBuffer, Picture, PictureLock, PlaneDesc};
use crate::pool::ObjectPool;

/// Most decoders one registry holds at once.
pub const MAX_DECODERS: usize = 16;

type SharedDecoder = Arc<Mutex<Decoder>>;

pub struct DecoderRegistry {
    decoders: Mutex<ObjectPool<SharedDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn pool_handle(handle: DecoderHandle) -> Handle<SharedDecoder> {
    Handle::from_raw(handle.raw())
}

/// Description of an unpadded picture with no crop and default colour
/// metadata.
pub fn default_picture_desc(format: ColorFormat, width: u32, height: u32) -> DecoderResult<PictureDesc> {
    if format == ColorFormat::Unknown {
        return Err(DecoderError::invalid_param("unknown colour format"));
    }
    Ok(PictureDesc::new(format, width, height))
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self {
            decoders: Mutex::new(ObjectPool::new(MAX_DECODERS)),
        }
    }

    fn lookup(&self, handle: DecoderHandle) -> DecoderResult<SharedDecoder> {
        self.decoders
            .lock()
            .get(pool_handle(handle))
            .cloned()
            .ok_or_else(|| {
                debug!(?handle, "Unknown decoder handle");
                DecoderError::invalid_param("unknown decoder handle")
            })
    }

    /// Run `f` on an initialised decoder.
    fn with_decoder<R>(
        &self,
        handle: DecoderHandle,
        f: impl FnOnce(&mut Decoder) -> DecoderResult<R>,
    ) -> DecoderResult<R> {
        let decoder = self.lookup(handle)?;
        let mut decoder = decoder.lock();
        if !decoder.is_initialized() {
            return Err(DecoderError::Uninitialized);
        }
        f(&mut decoder)
    }

    /// Run `f` on a decoder that has not been initialised yet.
    fn with_uninitialized<R>(
        &self,
        handle: DecoderHandle,
        f: impl FnOnce(&mut Decoder) -> DecoderResult<R>,
    ) -> DecoderResult<R> {
        let decoder = self.lookup(handle)?;
        let mut decoder = decoder.lock();
        if decoder.is_initialized() {
            return Err(DecoderError::Initialized);
        }
        f(&mut decoder)
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Create an uninitialised decoder driving `core`.
    ///
    /// # Errors
    ///
    /// `Error` when the registry already holds [`MAX_DECODERS`] decoders.
    pub fn create_decoder(&self, core: Box<dyn CoreDecoder + Send>) -> DecoderResult<DecoderHandle> {
        let decoder = Arc::new(Mutex::new(Decoder::new(core)));
        let handle = self
            .decoders
            .lock()
            .allocate(Arc::clone(&decoder))
            .ok_or_else(|| {
                error!(capacity = MAX_DECODERS, "Unable to allocate a decoder handle");
                DecoderError::error("decoder pool is full")
            })?;
        let handle = DecoderHandle::from_raw(handle.raw());
        decoder.lock().set_handle(handle);
        info!(?handle, "Created decoder");
        Ok(handle)
    }

    /// Release and forget a decoder. Its pictures go with it.
    pub fn destroy_decoder(&self, handle: DecoderHandle) -> DecoderResult<()> {
        let decoder = self
            .decoders
            .lock()
            .release(pool_handle(handle))
            .ok_or_else(|| DecoderError::invalid_param("unknown decoder handle"))?;
        // Join the event thread only once the decoder is unlocked: a
        // callback may be blocked on it.
        let mut events = decoder.lock().detach_events();
        events.shutdown();
        info!(?handle, "Destroyed decoder");
        Ok(())
    }

    /// Set one config value. Returns `Ok(false)` for an unknown name or a
    /// value of the wrong type; such values never stop initialisation.
    pub fn configure(&self, handle: DecoderHandle, name: &str, value: ConfigValue) -> DecoderResult<bool> {
        self.with_uninitialized(handle, |d| Ok(d.config_mut().set(name, value)))
    }

    /// Apply every key of a JSON object. Returns the keys that were not
    /// accepted.
    pub fn configure_from_json(&self, handle: DecoderHandle, json: &Value) -> DecoderResult<Vec<String>> {
        self.with_uninitialized(handle, |d| Ok(d.config_mut().from_json(json)?))
    }

    /// Read back one config value.
    pub fn config_value(&self, handle: DecoderHandle, name: &str) -> DecoderResult<Option<ConfigValue>> {
        let decoder = self.lookup(handle)?;
        let decoder = decoder.lock();
        Ok(decoder.config().get(name))
    }

    pub fn set_event_callback(&self, handle: DecoderHandle, callback: Option<EventCallback>) -> DecoderResult<()> {
        self.with_uninitialized(handle, |d| {
            d.set_event_callback(callback);
            Ok(())
        })
    }

    pub fn initialize(&self, handle: DecoderHandle) -> DecoderResult<()> {
        self.with_uninitialized(handle, Decoder::initialize)
    }

    // -- Data plane ---------------------------------------------------------

    pub fn send_enhancement_data(
        &self,
        handle: DecoderHandle,
        timestamp: i64,
        discontinuity: bool,
        data: &[u8],
    ) -> DecoderResult<()> {
        if data.is_empty() {
            return Err(DecoderError::invalid_param("empty enhancement data"));
        }
        self.with_decoder(handle, |d| d.feed_enhancement(timestamp, discontinuity, data))
    }

    pub fn send_base_picture(
        &self,
        handle: DecoderHandle,
        timestamp: i64,
        discontinuity: bool,
        picture: Handle<Picture>,
        timeout_us: u32,
        user_data: UserData,
    ) -> DecoderResult<()> {
        self.with_decoder(handle, |d| {
            d.feed_base(timestamp, discontinuity, picture, timeout_us, user_data)
        })
    }

    pub fn receive_finished_base_picture(&self, handle: DecoderHandle) -> DecoderResult<Handle<Picture>> {
        self.with_decoder(handle, Decoder::receive_base)
    }

    pub fn send_output_picture(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.feed_output(picture))
    }

    /// Take the next result. The result's own `code` says how that decode
    /// went; `Err` only means there was nothing to receive.
    pub fn receive_output_picture(&self, handle: DecoderHandle) -> DecoderResult<DecodeResult> {
        self.with_decoder(handle, Decoder::receive_output)
    }

    pub fn peek(&self, handle: DecoderHandle, timestamp: i64) -> DecoderResult<PeekResult> {
        self.with_decoder(handle, |d| d.peek(timestamp))
    }

    pub fn skip(&self, handle: DecoderHandle, timestamp: i64) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.skip(timestamp))
    }

    pub fn flush(&self, handle: DecoderHandle) -> DecoderResult<()> {
        self.with_decoder(handle, Decoder::flush)
    }

    pub fn synchronize(&self, handle: DecoderHandle, drop_pending: bool) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.synchronize(drop_pending))
    }

    pub fn stats(&self, handle: DecoderHandle) -> DecoderResult<DecoderStats> {
        self.with_decoder(handle, |d| Ok(d.stats()))
    }

    // -- Pictures -----------------------------------------------------------

    pub fn alloc_picture_managed(&self, handle: DecoderHandle, desc: &PictureDesc) -> DecoderResult<Handle<Picture>> {
        self.with_decoder(handle, |d| d.alloc_picture_managed(desc))
    }

    pub fn alloc_picture_external(
        &self,
        handle: DecoderHandle,
        desc: &PictureDesc,
        buffer: ExternalBuffer,
    ) -> DecoderResult<Handle<Picture>> {
        self.with_decoder(handle, |d| d.alloc_picture_external(desc, buffer))
    }

    /// Free a picture, handing back the memory of an external one.
    pub fn free_picture(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<Option<ExternalBuffer>> {
        self.with_decoder(handle, |d| d.free_picture(picture))
    }

    pub fn get_picture_desc(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<PictureDesc> {
        self.with_decoder(handle, |d| Ok(d.picture(picture)?.desc()))
    }

    pub fn set_picture_desc(&self, handle: DecoderHandle, picture: Handle<Picture>, desc: &PictureDesc) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.set_picture_desc(picture, desc))
    }

    pub fn get_picture_buffer_desc(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<BufferDesc> {
        self.with_decoder(handle, |d| {
            d.picture(picture)?
                .buffer_desc()
                .ok_or_else(|| DecoderError::error("picture has no memory bound"))
        })
    }

    pub fn get_picture_plane_count(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<usize> {
        self.with_decoder(handle, |d| Ok(d.picture(picture)?.plane_count()))
    }

    pub fn get_picture_plane_desc(
        &self,
        handle: DecoderHandle,
        picture: Handle<Picture>,
        plane: usize,
    ) -> DecoderResult<PlaneDesc> {
        self.with_decoder(handle, |d| {
            d.picture(picture)?
                .plane_desc(plane)
                .ok_or_else(|| DecoderError::invalid_param("plane index out of range"))
        })
    }

    pub fn set_picture_user_data(&self, handle: DecoderHandle, picture: Handle<Picture>, user_data: UserData) -> DecoderResult<()> {
        self.with_decoder(handle, |d| {
            d.picture_mut(picture)?.set_user_data(user_data);
            Ok(())
        })
    }

    pub fn get_picture_user_data(&self, handle: DecoderHandle, picture: Handle<Picture>) -> DecoderResult<UserData> {
        self.with_decoder(handle, |d| Ok(d.picture(picture)?.user_data()))
    }

    pub fn set_picture_flag(
        &self,
        handle: DecoderHandle,
        picture: Handle<Picture>,
        flag: PictureFlag,
        value: bool,
    ) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.picture_mut(picture)?.set_flag(flag, value))
    }

    pub fn get_picture_flag(&self, handle: DecoderHandle, picture: Handle<Picture>, flag: PictureFlag) -> DecoderResult<bool> {
        self.with_decoder(handle, |d| d.picture(picture)?.flag(flag))
    }

    pub fn lock_picture(
        &self,
        handle: DecoderHandle,
        picture: Handle<Picture>,
        access: Access,
    ) -> DecoderResult<Handle<PictureLock>> {
        self.with_decoder(handle, |d| d.lock_picture(picture, access))
    }

    pub fn unlock_picture(&self, handle: DecoderHandle, lock: Handle<PictureLock>) -> DecoderResult<()> {
        self.with_decoder(handle, |d| d.unlock_picture(lock))
    }

    /// Read one plane of a locked picture. `f` gets the plane's bytes and
    /// its row stride in bytes.
    pub fn picture_lock_plane<R>(
        &self,
        handle: DecoderHandle,
        lock: Handle<PictureLock>,
        plane: usize,
        f: impl FnOnce(&[u8], u32) -> R,
    ) -> DecoderResult<R> {
        self.with_decoder(handle, |d| d.with_locked_plane(lock, plane, f))
    }

    /// Write one plane of a picture locked with write access.
    pub fn picture_lock_plane_mut<R>(
        &self,
        handle: DecoderHandle,
        lock: Handle<PictureLock>,
        plane: usize,
        f: impl FnOnce(&mut [u8], u32) -> R,
    ) -> DecoderResult<R> {
        self.with_decoder(handle, |d| d.with_locked_plane_mut(lock, plane, f))
    }
}
