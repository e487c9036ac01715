//! The decode pipeline.
//!
//! Three input lanes arrive independently: base pictures, enhancement data
//! and output pictures. Whenever the head of each lane is available, the
//! decoder matches them by timehandle, decides between enhancing, passing the
//! base through, or failing, and queues a [`DecodeResult`]. All of this runs
//! synchronously on the caller's thread; only event delivery is offloaded.
//!
//! A `Decoder` is not internally synchronised. The [`DecoderRegistry`]
//! serialises every call on one decoder behind its own lock.
//!
//! [`DecoderRegistry`]: crate::registry::DecoderRegistry

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use lcevc_common::{
    latest_discontinuity, Access, ColorFormat, DecodeInformation, DecoderConfig, DecoderError,
    DecoderResult, EventKind, Handle, PassthroughPolicy, PictureDesc, ReturnCode, Timehandle,
    UserData,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::buffer_manager::{BufferManager, BufferStats};
use crate::core::{
    CoreColorSpace, CoreConfig, CoreDecoder, CoreImage, CoreResult, Loq, PipelineMode,
    SFilterMode, ScalingMode, StreamDescriptor,
};
use crate::event_dispatcher::{Event, EventCallback, EventDispatcher};
use crate::lcevc_processor::LcevcProcessor;
use crate::logging;
use crate::picture::{ExternalBuffer, Picture, PictureLock};
use crate::pool::ObjectPool;

/// Public handle of a decoder.
pub type DecoderHandle = Handle<Decoder>;

const PICTURE_POOL_CAPACITY: usize = 1024;
const PICTURE_LOCK_POOL_CAPACITY: usize = PICTURE_POOL_CAPACITY;

// ---------------------------------------------------------------------------
// Queue entries
// ---------------------------------------------------------------------------

/// A base picture waiting for its output picture.
#[derive(Clone, Copy, Debug)]
struct BaseData {
    picture: Handle<Picture>,
    /// Microseconds since the decoder was created.
    insertion_us: u64,
    timeout_us: u32,
}

/// Outcome of one matched decode, or of a skip.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeResult {
    pub picture: Handle<Picture>,
    pub code: ReturnCode,
    /// Discontinuity count of the base the result was decoded from.
    pub cc: u16,
    pub info: DecodeInformation,
}

/// Output dimensions predicted by [`Decoder::peek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeekResult {
    /// What the decode at this timestamp would return.
    pub code: ReturnCode,
    pub width: u32,
    pub height: u32,
}

/// Queue depths and counters, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    pub base_queue: usize,
    pub pending_outputs: usize,
    pub unprocessed_enhancements: usize,
    pub processed_enhancements: usize,
    pub results: usize,
    pub finished_bases: usize,
    pub decodes: u64,
    pub enhanced: u64,
    pub passthroughs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub temporal_accumulations: u64,
    pub pictures: usize,
    pub buffers: BufferStats,
}

/// One base matched with its enhancement data and output picture.
struct MatchedDecode {
    base: BaseData,
    stream: Option<Arc<StreamDescriptor>>,
    output: Handle<Picture>,
}

/// How the base reaches the engine: in place, or as a private copy when the
/// engine would write into a picture the caller did not let us modify.
enum BaseRef<'a> {
    Borrowed(&'a mut Picture),
    OwnedCopy(Picture),
}

impl BaseRef<'_> {
    fn picture_mut(&mut self) -> &mut Picture {
        match self {
            BaseRef::Borrowed(picture) => picture,
            BaseRef::OwnedCopy(picture) => picture,
        }
    }
}

/// What to do with one matched base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Decision {
    passthrough: bool,
    fail: bool,
}

fn decide(policy: PassthroughPolicy, timeout: bool, enhancement_available: bool) -> Decision {
    let needed = timeout || !enhancement_available;
    match policy {
        PassthroughPolicy::Disable => Decision {
            passthrough: false,
            fail: needed,
        },
        PassthroughPolicy::Allow => Decision {
            passthrough: needed,
            fail: false,
        },
        PassthroughPolicy::Force => Decision {
            passthrough: true,
            fail: false,
        },
    }
}

/// Output format for an enhanced stream.
fn output_format(stream: &StreamDescriptor, current: ColorFormat) -> Option<ColorFormat> {
    use ColorFormat::*;

    let depth = stream.output_bitdepth();
    if current == Nv12_8 && stream.color_space == CoreColorSpace::Yuv420 && depth == 8 {
        return Some(Nv12_8);
    }
    let formats = match stream.color_space {
        CoreColorSpace::Yuv420 => [I420_8, I420_10LE, I420_12LE, I420_14LE, I420_16LE],
        CoreColorSpace::Yuv422 => [I422_8, I422_10LE, I422_12LE, I422_14LE, I422_16LE],
        CoreColorSpace::Yuv444 => [I444_8, I444_10LE, I444_12LE, I444_14LE, I444_16LE],
        CoreColorSpace::Monochrome => [Gray8, Gray10LE, Gray12LE, Gray14LE, Gray16LE],
    };
    let index = match depth {
        8 => 0,
        10 => 1,
        12 => 2,
        14 => 3,
        16 => 4,
        _ => return None,
    };
    Some(formats[index])
}

fn next_cc(cc: u16, discontinuity: bool) -> u16 {
    if discontinuity {
        cc.wrapping_add(1)
    } else {
        cc
    }
}

fn engine_call(th: Timehandle, what: &str, result: CoreResult<()>) -> DecoderResult<()> {
    result.map_err(|e| {
        error!(cc = th.cc(), pts = th.timestamp(), error = %e, "Failed to {what}");
        DecoderError::error(format!("failed to {what}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct Decoder {
    config: DecoderConfig,
    initialized: bool,
    clock: Instant,

    core: Box<dyn CoreDecoder + Send>,
    processor: LcevcProcessor,
    events: EventDispatcher,

    buffers: BufferManager,
    pictures: ObjectPool<Picture>,
    locks: ObjectPool<PictureLock>,

    base_cc: u16,
    enhancement_cc: u16,

    bases: VecDeque<BaseData>,
    pending_outputs: VecDeque<Handle<Picture>>,
    results: VecDeque<DecodeResult>,
    finished_bases: VecDeque<Handle<Picture>>,

    stats: DecoderStats,
}

impl Decoder {
    /// A decoder in the uninitialised state, driving `core`.
    pub fn new(core: Box<dyn CoreDecoder + Send>) -> Self {
        Self {
            config: DecoderConfig::default(),
            initialized: false,
            clock: Instant::now(),
            core,
            processor: LcevcProcessor::new(),
            events: EventDispatcher::new(DecoderHandle::INVALID),
            buffers: BufferManager::new(),
            pictures: ObjectPool::new(PICTURE_POOL_CAPACITY),
            locks: ObjectPool::new(PICTURE_LOCK_POOL_CAPACITY),
            base_cc: 0,
            enhancement_cc: 0,
            bases: VecDeque::new(),
            pending_outputs: VecDeque::new(),
            results: VecDeque::new(),
            finished_bases: VecDeque::new(),
            stats: DecoderStats::default(),
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Handle passed to the event callback.
    pub fn set_handle(&mut self, handle: DecoderHandle) {
        self.events.set_decoder(handle);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DecoderConfig {
        &mut self.config
    }

    pub fn set_event_callback(&mut self, callback: Option<EventCallback>) {
        self.events.set_callback(callback);
    }

    /// Validate the config and bring up logging, events, the engine and the
    /// enhancement processor, in that order.
    ///
    /// # Errors
    ///
    /// `Initialized` if already initialised; `Error` if any step fails.
    pub fn initialize(&mut self) -> DecoderResult<()> {
        if self.initialized {
            return Err(DecoderError::Initialized);
        }

        logging::init_logs(&self.config);
        if let Err(e) = self.config.validate() {
            error!(error = %e, "Failed to initialize config");
            return Err(e.into());
        }

        if !self.events.is_running() {
            self.events.start(self.config.event_mask())?;
        }

        let core_config = CoreConfig::from(&self.config);
        if let Err(e) = self.core.open(&core_config) {
            error!(error = %e, "Failed to initialize core decoder");
            return Err(DecoderError::error(e.to_string()));
        }

        self.processor.initialise(
            self.config.unprocessed_capacity(),
            self.config.pss_surface_fp_setting,
        );
        self.clock = Instant::now();
        self.initialized = true;
        info!(
            capacity = self.config.loq_unprocessed_cap,
            results_capacity = self.config.results_queue_cap,
            passthrough = ?self.config.passthrough_policy(),
            "Decoder initialized"
        );

        // Enhancement first, for callers that send whatever they are told
        // they can without checking order.
        self.events.generate_kind(EventKind::CanSendEnhancement);
        self.events.generate_kind(EventKind::CanSendBase);
        self.events.generate_kind(EventKind::CanSendPicture);
        Ok(())
    }

    /// Tear down in reverse order of initialisation. Safe to call twice.
    pub fn release(&mut self) {
        self.detach_events().shutdown();
    }

    /// Release the processor and engine, queue `Exit`, and hand back the
    /// event dispatcher still running. The caller joins it with
    /// [`EventDispatcher::shutdown`] after letting go of this decoder, since
    /// a callback may be waiting to lock it.
    pub fn detach_events(&mut self) -> EventDispatcher {
        if self.initialized {
            self.processor.release();
            self.core.close();
            self.initialized = false;
            info!("Decoder released");
        }
        if self.events.is_running() {
            self.events.generate_kind(EventKind::Exit);
        }
        std::mem::replace(&mut self.events, EventDispatcher::new(DecoderHandle::INVALID))
    }

    fn elapsed_us(&self) -> u64 {
        self.clock.elapsed().as_micros() as u64
    }

    // -- Queue state --------------------------------------------------------

    fn input_capacity(&self) -> usize {
        self.processor.unprocessed_capacity()
    }

    fn is_base_queue_full(&self) -> bool {
        self.bases.len() >= self.input_capacity()
    }

    fn is_output_queue_full(&self) -> bool {
        self.pending_outputs.len() >= self.input_capacity()
    }

    fn is_enhancement_queue_full(&self) -> bool {
        self.processor.is_unprocessed_full()
    }

    fn is_results_queue_full(&self) -> bool {
        self.results.len() >= self.config.results_capacity()
    }

    // -- Inputs -------------------------------------------------------------

    /// Queue a base picture for `timestamp`.
    ///
    /// # Errors
    ///
    /// `Again` if the base queue is full; `Error` for an unknown picture.
    pub fn feed_base(
        &mut self,
        timestamp: i64,
        discontinuity: bool,
        picture: Handle<Picture>,
        timeout_us: u32,
        user_data: UserData,
    ) -> DecoderResult<()> {
        if self.is_base_queue_full() {
            info!(
                size = self.bases.len(),
                capacity = self.input_capacity(),
                "Base queue is full"
            );
            return Err(DecoderError::Again);
        }

        // The count only moves once the base is accepted, so a refused
        // discontinuity can be retried.
        let cc = next_cc(self.base_cc, discontinuity);
        let timehandle = Timehandle::new(cc, timestamp);
        let base = self.pictures.get_mut(picture).ok_or_else(|| {
            error!(cc, pts = timestamp, "Unknown base picture");
            DecoderError::error("unknown base picture")
        })?;
        base.set_timehandle(timehandle);
        base.set_user_data(user_data);
        self.base_cc = cc;

        self.bases.push_back(BaseData {
            picture,
            insertion_us: self.elapsed_us(),
            timeout_us,
        });
        self.try_to_queue_decodes();
        Ok(())
    }

    /// Queue enhancement data for `timestamp`.
    ///
    /// # Errors
    ///
    /// `Again` if the enhancement queue is full; `Error` for a duplicate
    /// timestamp.
    pub fn feed_enhancement(&mut self, timestamp: i64, discontinuity: bool, data: &[u8]) -> DecoderResult<()> {
        if self.is_enhancement_queue_full() {
            info!(capacity = self.input_capacity(), "Enhancement queue is full");
            return Err(DecoderError::Again);
        }

        let cc = next_cc(self.enhancement_cc, discontinuity);
        self.processor.insert(data, Timehandle::new(cc, timestamp), Instant::now())?;
        self.enhancement_cc = cc;
        self.try_to_queue_decodes();
        Ok(())
    }

    /// Queue a picture to decode into.
    ///
    /// # Errors
    ///
    /// `Again` if the output queue is full; `Error` for an unknown picture.
    pub fn feed_output(&mut self, picture: Handle<Picture>) -> DecoderResult<()> {
        if self.is_output_queue_full() {
            debug!(
                size = self.pending_outputs.len(),
                capacity = self.input_capacity(),
                "Pending output queue is full"
            );
            return Err(DecoderError::Again);
        }
        if !self.pictures.is_valid(picture) {
            error!(?picture, "Unknown output picture");
            return Err(DecoderError::error("unknown output picture"));
        }
        self.pending_outputs.push_back(picture);
        self.try_to_queue_decodes();
        Ok(())
    }

    // -- Outputs ------------------------------------------------------------

    /// Take the oldest decode result.
    ///
    /// # Errors
    ///
    /// `Again` if no result is ready.
    pub fn receive_output(&mut self) -> DecoderResult<DecodeResult> {
        let result = self.results.pop_front().ok_or(DecoderError::Again)?;
        self.try_to_queue_decodes();
        self.events.generate(
            Event::new(EventKind::OutputPictureDone)
                .with_picture(result.picture)
                .with_decode_info(result.info.clone()),
        );
        Ok(result)
    }

    /// Take the oldest base picture the decoder is done with.
    ///
    /// # Errors
    ///
    /// `Again` if there is none.
    pub fn receive_base(&mut self) -> DecoderResult<Handle<Picture>> {
        self.finished_bases.pop_front().ok_or(DecoderError::Again)
    }

    // -- Matching -----------------------------------------------------------

    fn try_to_queue_decodes(&mut self) {
        while let Some(MatchedDecode { base, stream, output }) = self.next_decode_data() {
            let base_alive = self.pictures.is_valid(base.picture);
            let result = self.do_decode(base, stream.as_deref(), output);
            debug!(
                cc = result.cc,
                pts = result.info.timestamp,
                code = ?result.code,
                enhanced = result.info.enhanced,
                "Decode finished"
            );
            self.results.push_back(result);

            // Raised even for failures: the result is ready either way.
            self.events.generate_kind(EventKind::CanReceive);
            if base_alive {
                self.events
                    .generate(Event::new(EventKind::BasePictureDone).with_picture(base.picture));
                self.finished_bases.push_back(base.picture);
            }
        }
    }

    /// Forget output pictures that were freed while waiting in the queue.
    fn drop_freed_outputs(&mut self) {
        let outputs_full = self.is_output_queue_full();
        let queued = self.pending_outputs.len();
        let pictures = &self.pictures;
        self.pending_outputs.retain(|picture| pictures.is_valid(*picture));
        let dropped = queued - self.pending_outputs.len();
        if dropped > 0 {
            warn!(dropped, "Output pictures were freed while queued");
            self.raise_if_relieved(false, false, outputs_full);
        }
    }

    /// Pop the next matched base, enhancement and output, if all are ready.
    fn next_decode_data(&mut self) -> Option<MatchedDecode> {
        if self.is_results_queue_full() {
            debug!(
                size = self.results.len(),
                capacity = self.config.results_queue_cap,
                "Results queue is full, waiting for the caller to receive"
            );
            return None;
        }

        self.drop_freed_outputs();
        let head = *self.bases.front()?;
        if self.pending_outputs.is_empty() {
            return None;
        }
        // A base freed while queued still takes an output, so that its
        // failure is reported and the lanes keep moving.
        let timehandle = self
            .pictures
            .get(head.picture)
            .map_or(Timehandle::INVALID, Picture::timehandle);

        // Enhancement data is sent ahead of its base, so if it is missing now
        // it is not coming.
        let bases_full = self.is_base_queue_full();
        let enhancements_full = self.is_enhancement_queue_full();
        let outputs_full = self.is_output_queue_full();

        let stream = if timehandle.is_valid() {
            self.processor.extract(self.core.as_mut(), timehandle, true)
        } else {
            None
        };
        self.bases.pop_front();
        let output = self.pending_outputs.pop_front()?;

        self.raise_if_relieved(bases_full, enhancements_full, outputs_full);
        Some(MatchedDecode {
            base: head,
            stream,
            output,
        })
    }

    /// Raise `CanSend*` for each lane that just went from full to not full.
    fn raise_if_relieved(&self, bases_full: bool, enhancements_full: bool, outputs_full: bool) {
        if bases_full && !self.is_base_queue_full() {
            self.events.generate_kind(EventKind::CanSendBase);
        }
        if enhancements_full && !self.is_enhancement_queue_full() {
            self.events.generate_kind(EventKind::CanSendEnhancement);
        }
        if outputs_full && !self.is_output_queue_full() {
            self.events.generate_kind(EventKind::CanSendPicture);
        }
    }

    // -- Decode -------------------------------------------------------------

    fn do_decode(
        &mut self,
        base: BaseData,
        stream: Option<&StreamDescriptor>,
        output: Handle<Picture>,
    ) -> DecodeResult {
        let timeout = base.insertion_us + u64::from(base.timeout_us) < self.elapsed_us();
        let policy = self.config.passthrough_policy();
        let decision = decide(policy, timeout, stream.is_some());

        self.stats.decodes += 1;
        let Some(pic) = self.pictures.get(base.picture) else {
            error!(?output, "Base picture was freed while queued");
            self.stats.failures += 1;
            return DecodeResult {
                picture: output,
                code: ReturnCode::Error,
                cc: Timehandle::INVALID.cc(),
                info: DecodeInformation::default(),
            };
        };
        // Describe the decode before running it, so that a failure still
        // reports which frame it was.
        let timehandle = pic.timehandle();
        let mut result = DecodeResult {
            picture: output,
            code: ReturnCode::Success,
            cc: timehandle.cc(),
            info: DecodeInformation {
                timestamp: timehandle.timestamp(),
                has_base: true,
                has_enhancement: stream.is_some(),
                skipped: false,
                enhanced: !decision.passthrough && !decision.fail,
                base_width: pic.width(),
                base_height: pic.height(),
                base_bitdepth: pic.bit_depth(),
                base_user_data: pic.user_data(),
            },
        };

        if decision.fail {
            error!(
                cc = timehandle.cc(),
                pts = timehandle.timestamp(),
                enhancement = stream.is_some(),
                ?policy,
                "Failing decode"
            );
            self.stats.failures += 1;
            result.code = if timeout {
                ReturnCode::Timeout
            } else {
                ReturnCode::Error
            };
            return result;
        }

        let outcome = if decision.passthrough {
            if !timeout && policy != PassthroughPolicy::Force {
                info!(
                    cc = timehandle.cc(),
                    pts = timehandle.timestamp(),
                    "Passing base through, no enhancement data"
                );
            }
            self.stats.passthroughs += 1;
            self.decode_passthrough(base.picture, output)
        } else if let Some(stream) = stream {
            self.stats.enhanced += 1;
            self.decode_enhance(base.picture, output, stream)
        } else {
            Err(DecoderError::error("no enhancement data to decode with"))
        };

        result.code = match outcome {
            Err(_) => {
                self.stats.failures += 1;
                ReturnCode::Error
            }
            Ok(()) if timeout => ReturnCode::Timeout,
            Ok(()) => ReturnCode::Success,
        };
        result
    }

    fn decode_passthrough(&mut self, base: Handle<Picture>, output: Handle<Picture>) -> DecoderResult<()> {
        let (base, out) = self
            .pictures
            .get_pair_mut(base, output)
            .ok_or_else(|| DecoderError::error("base or output picture is gone"))?;
        let th = base.timehandle();
        out.set_timehandle(th);
        if let Err(e) = out.copy_metadata(base, &mut self.buffers) {
            error!(
                cc = th.cc(),
                pts = th.timestamp(),
                "Failed to set up output picture, invalid format or unmodifiable destination"
            );
            return Err(e);
        }
        out.copy_data(base)
    }

    fn decode_enhance(
        &mut self,
        base: Handle<Picture>,
        output: Handle<Picture>,
        stream: &StreamDescriptor,
    ) -> DecoderResult<()> {
        let Self {
            pictures,
            buffers,
            core,
            config,
            ..
        } = self;
        let (base, out) = pictures
            .get_pair_mut(base, output)
            .ok_or_else(|| DecoderError::error("base or output picture is gone"))?;
        let th = base.timehandle();

        out.set_timehandle(th);
        setup_enhanced_output(out, stream, buffers).inspect_err(|_| {
            error!(
                cc = th.cc(),
                pts = th.timestamp(),
                "Failed to set up output picture, invalid format or unmodifiable destination"
            );
        })?;

        // Speed mode applies LOQ1 residuals straight onto the base.
        let engine_writes_base =
            stream.pipeline_mode != PipelineMode::Precision && stream.loq_enabled(Loq::Loq1);
        let mut base_ref = if base.can_modify() || !engine_writes_base {
            BaseRef::Borrowed(base)
        } else {
            let mut copy = Picture::managed();
            copy.copy_metadata(base, buffers)?;
            copy.copy_data(base)?;
            copy.set_timehandle(th);
            BaseRef::OwnedCopy(copy)
        };

        let mut intermediate = match stream.scaling_mode(Loq::Loq1) {
            ScalingMode::Scale0D => None,
            mode => {
                let layout = base_ref.picture_mut().layout().clone();
                let height = if mode == ScalingMode::Scale2D {
                    layout.height() * 2
                } else {
                    layout.height()
                };
                let desc = PictureDesc::new(layout.format(), layout.width() * 2, height);
                Some(Picture::new_managed(&desc, buffers)?)
            }
        };

        let outcome = run_engine(
            core.as_mut(),
            th,
            stream,
            config.s_filter_strength,
            base_ref.picture_mut(),
            intermediate.as_mut(),
            out,
        );

        if let Some(mut picture) = intermediate.take() {
            picture.unbind_memory(buffers)?;
        }
        if let BaseRef::OwnedCopy(mut copy) = base_ref {
            copy.unbind_memory(buffers)?;
        }
        outcome
    }

    // -- Flush / skip / peek ------------------------------------------------

    /// Drop every unmatched input. Results already produced stay receivable
    /// but are marked `Flushed`, and their pictures' memory is released.
    pub fn flush(&mut self) -> DecoderResult<()> {
        let enhancements_full = self.is_enhancement_queue_full();
        self.processor.flush();
        self.raise_if_relieved(false, enhancements_full, false);

        let bases_full = self.is_base_queue_full();
        while let Some(base) = self.bases.pop_front() {
            self.events
                .generate(Event::new(EventKind::BasePictureDone).with_picture(base.picture));
        }
        self.raise_if_relieved(bases_full, false, false);

        let outputs_full = self.is_output_queue_full();
        self.pending_outputs.clear();
        self.raise_if_relieved(false, false, outputs_full);

        for result in &mut self.results {
            if let Some(picture) = self.pictures.get_mut(result.picture) {
                if let Err(e) = picture.unbind_memory(&mut self.buffers) {
                    warn!(error = %e, "Could not release flushed output memory");
                }
            }
            result.code = ReturnCode::Flushed;
        }
        info!(results = self.results.len(), "Flushed decoder");
        Ok(())
    }

    /// Treat everything up to and including `timestamp` as consumed without
    /// producing output.
    pub fn skip(&mut self, timestamp: i64) -> DecoderResult<()> {
        let cc = latest_discontinuity(self.base_cc, self.enhancement_cc);
        if self.base_cc != self.enhancement_cc {
            info!(
                base_cc = self.base_cc,
                enhancement_cc = self.enhancement_cc,
                cc,
                "Base and enhancement discontinuity counts differ, skipping from the latest"
            );
        }

        let target = Timehandle::new(cc, timestamp);
        let bases_full = self.is_base_queue_full();
        let last_base = Timehandle::new(self.base_cc, timestamp);
        while let Some(head) = self.bases.front().copied() {
            let th = self
                .pictures
                .get(head.picture)
                .map_or(Timehandle::INVALID, Picture::timehandle);
            if th.is_valid() && th > last_base {
                break;
            }
            self.bases.pop_front();
            if th.is_valid() {
                self.events
                    .generate(Event::new(EventKind::BasePictureDone).with_picture(head.picture));
                self.finished_bases.push_back(head.picture);
            }
        }
        self.raise_if_relieved(bases_full, false, false);

        // Still parsed, so skipped frames keep the temporal state right.
        let enhancements_full = self.is_enhancement_queue_full();
        self.processor.extract(self.core.as_mut(), target, true);
        self.raise_if_relieved(false, enhancements_full, false);

        let mut found = false;
        for result in &mut self.results {
            let th = Timehandle::new(result.cc, result.info.timestamp);
            if th <= target {
                if !result.info.skipped {
                    self.stats.skipped += 1;
                }
                result.info.skipped = true;
                result.code = ReturnCode::Success;
            }
            found |= th == target;
        }

        if !found && !self.is_results_queue_full() {
            self.drop_freed_outputs();
            let outputs_full = self.is_output_queue_full();
            if let Some(picture) = self.pending_outputs.pop_front() {
                self.results.push_back(DecodeResult {
                    picture,
                    code: ReturnCode::Success,
                    cc,
                    info: DecodeInformation {
                        timestamp,
                        skipped: true,
                        ..DecodeInformation::default()
                    },
                });
                self.stats.skipped += 1;
                self.events.generate_kind(EventKind::CanReceive);
                self.raise_if_relieved(false, false, outputs_full);
            }
        }
        debug!(cc, pts = timestamp, "Skipped");
        Ok(())
    }

    /// Predict the output size at `timestamp` without consuming anything.
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing is known about `timestamp` yet, or when
    /// the passthrough policy leaves no way to decode it.
    pub fn peek(&mut self, timestamp: i64) -> DecoderResult<PeekResult> {
        let base_th = Timehandle::new(self.base_cc, timestamp);

        // Easy case: the decode has already happened.
        if let Some(result) = self
            .results
            .iter()
            .find(|r| r.info.timestamp == timestamp && r.cc == base_th.cc())
        {
            let picture = self
                .pictures
                .get(result.picture)
                .ok_or(DecoderError::NotFound)?;
            return Ok(PeekResult {
                code: result.code,
                width: picture.width(),
                height: picture.height(),
            });
        }

        let enhancement_th = Timehandle::new(self.enhancement_cc, timestamp);
        let stream = self
            .processor
            .extract(self.core.as_mut(), enhancement_th, false);
        let base = self.bases.iter().copied().find(|b| {
            self.pictures
                .get(b.picture)
                .is_some_and(|p| p.timehandle() == base_th)
        });
        let policy = self.config.passthrough_policy();

        let Some(base) = base else {
            return match stream {
                Some(stream) if policy != PassthroughPolicy::Force => Ok(PeekResult {
                    code: ReturnCode::Success,
                    width: stream.global_width,
                    height: stream.global_height,
                }),
                _ => Err(DecoderError::NotFound),
            };
        };
        if policy == PassthroughPolicy::Disable && stream.is_none() {
            return Err(DecoderError::NotFound);
        }

        let picture = self.pictures.get(base.picture).ok_or(DecoderError::NotFound)?;
        let timeout = base.insertion_us + u64::from(base.timeout_us) < self.elapsed_us();
        let decision = decide(policy, timeout, stream.is_some());
        let (width, height) = match (&stream, decision) {
            (_, Decision { passthrough: true, .. }) => (picture.width(), picture.height()),
            (Some(stream), Decision { fail: false, .. }) => (stream.global_width, stream.global_height),
            _ => (0, 0),
        };
        let code = if timeout {
            ReturnCode::Timeout
        } else if decision.fail {
            ReturnCode::Error
        } else {
            ReturnCode::Success
        };
        Ok(PeekResult { code, width, height })
    }

    /// Always synchronised: decodes complete inside the calls that match them.
    pub fn synchronize(&mut self, _drop_pending: bool) -> DecoderResult<()> {
        Ok(())
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            base_queue: self.bases.len(),
            pending_outputs: self.pending_outputs.len(),
            unprocessed_enhancements: self.processor.unprocessed_len(),
            processed_enhancements: self.processor.processed_len(),
            results: self.results.len(),
            finished_bases: self.finished_bases.len(),
            temporal_accumulations: self.processor.temporal_accumulations(),
            pictures: self.pictures.len(),
            buffers: self.buffers.stats(),
            ..self.stats
        }
    }

    // -- Pictures -----------------------------------------------------------

    fn store_picture(&mut self, picture: Picture) -> DecoderResult<Handle<Picture>> {
        let managed = picture.is_managed();
        self.pictures.allocate(picture).ok_or_else(|| {
            error!(managed, "Unable to allocate a picture handle");
            DecoderError::error("picture pool is full")
        })
    }

    pub fn alloc_picture_managed(&mut self, desc: &PictureDesc) -> DecoderResult<Handle<Picture>> {
        let picture = Picture::new_managed(desc, &mut self.buffers)?;
        self.store_picture(picture)
    }

    pub fn alloc_picture_external(
        &mut self,
        desc: &PictureDesc,
        buffer: ExternalBuffer,
    ) -> DecoderResult<Handle<Picture>> {
        let picture = Picture::new_external(desc, buffer)?;
        self.store_picture(picture)
    }

    /// Release a picture. Its lock, if any, goes with it; managed memory
    /// returns to the buffer pool and external memory is handed back.
    pub fn free_picture(&mut self, handle: Handle<Picture>) -> DecoderResult<Option<ExternalBuffer>> {
        let mut picture = self.pictures.release(handle).ok_or_else(|| {
            error!(?handle, "Trying to release a picture that was never allocated");
            DecoderError::invalid_param("unknown picture")
        })?;
        if let Some(lock) = picture.lock_handle() {
            self.locks.release(lock);
            picture.unlock();
        }
        let external = picture.take_external_buffer();
        picture.unbind_memory(&mut self.buffers)?;
        Ok(external)
    }

    pub fn picture(&self, handle: Handle<Picture>) -> DecoderResult<&Picture> {
        self.pictures
            .get(handle)
            .ok_or_else(|| DecoderError::invalid_param("unknown picture"))
    }

    pub fn picture_mut(&mut self, handle: Handle<Picture>) -> DecoderResult<&mut Picture> {
        self.pictures
            .get_mut(handle)
            .ok_or_else(|| DecoderError::invalid_param("unknown picture"))
    }

    pub fn set_picture_desc(&mut self, handle: Handle<Picture>, desc: &PictureDesc) -> DecoderResult<()> {
        let picture = self
            .pictures
            .get_mut(handle)
            .ok_or_else(|| DecoderError::invalid_param("unknown picture"))?;
        picture.set_desc(desc, &mut self.buffers)
    }

    /// Lock a picture for direct memory access.
    ///
    /// # Errors
    ///
    /// `InvalidParam` for an unknown picture or `Unknown` access; `Error` if
    /// the picture is already locked.
    pub fn lock_picture(&mut self, handle: Handle<Picture>, access: Access) -> DecoderResult<Handle<PictureLock>> {
        if access == Access::Unknown {
            return Err(DecoderError::invalid_param("unknown lock access"));
        }
        let picture = self
            .pictures
            .get_mut(handle)
            .ok_or_else(|| DecoderError::invalid_param("unknown picture"))?;
        if picture.is_locked() {
            let th = picture.timehandle();
            error!(cc = th.cc(), pts = th.timestamp(), "Picture is already locked");
            return Err(DecoderError::error("picture is already locked"));
        }
        let lock = self
            .locks
            .allocate(PictureLock {
                picture: handle,
                access,
            })
            .ok_or_else(|| DecoderError::error("picture lock pool is full"))?;
        if !picture.lock(access, lock) {
            self.locks.release(lock);
            return Err(DecoderError::error("failed to lock picture"));
        }
        Ok(lock)
    }

    pub fn unlock_picture(&mut self, lock: Handle<PictureLock>) -> DecoderResult<()> {
        let released = self.locks.release(lock).ok_or_else(|| {
            error!(?lock, "Unrecognised picture lock handle");
            DecoderError::invalid_param("unknown picture lock")
        })?;
        if let Some(picture) = self.pictures.get_mut(released.picture) {
            picture.unlock();
        }
        Ok(())
    }

    fn locked_picture(&self, lock: Handle<PictureLock>) -> DecoderResult<(Access, Handle<Picture>)> {
        let entry = self
            .locks
            .get(lock)
            .ok_or_else(|| DecoderError::invalid_param("unknown picture lock"))?;
        Ok((entry.access, entry.picture))
    }

    /// Read one plane of a locked picture: its bytes and row stride.
    pub fn with_locked_plane<R>(
        &self,
        lock: Handle<PictureLock>,
        plane: usize,
        f: impl FnOnce(&[u8], u32) -> R,
    ) -> DecoderResult<R> {
        let (_, handle) = self.locked_picture(lock)?;
        let picture = self.picture(handle)?;
        let stride = picture
            .plane_desc(plane)
            .ok_or_else(|| DecoderError::invalid_param("plane index out of range"))?
            .row_byte_stride;
        let data = picture
            .plane(plane)
            .ok_or_else(|| DecoderError::error("picture has no memory bound"))?;
        Ok(f(data, stride))
    }

    /// Write one plane of a picture locked for writing.
    pub fn with_locked_plane_mut<R>(
        &mut self,
        lock: Handle<PictureLock>,
        plane: usize,
        f: impl FnOnce(&mut [u8], u32) -> R,
    ) -> DecoderResult<R> {
        let (access, handle) = self.locked_picture(lock)?;
        if !access.allows_write() {
            return Err(DecoderError::invalid_param("picture is locked read-only"));
        }
        let picture = self.picture_mut(handle)?;
        let stride = picture
            .plane_desc(plane)
            .ok_or_else(|| DecoderError::invalid_param("plane index out of range"))?
            .row_byte_stride;
        let data = picture
            .plane_mut(plane)
            .ok_or_else(|| DecoderError::error("picture has no memory bound"))?;
        Ok(f(data, stride))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.release();
    }
}

/// Describe the output picture for an enhanced decode of `stream`.
fn setup_enhanced_output(
    out: &mut Picture,
    stream: &StreamDescriptor,
    buffers: &mut BufferManager,
) -> DecoderResult<()> {
    let mut desc = out.desc();
    desc.width = stream.global_width;
    desc.height = stream.global_height;
    if let Some(window) = stream.conformance_window {
        desc.crop_top = window.top;
        desc.crop_bottom = window.bottom;
        desc.crop_left = window.left;
        desc.crop_right = window.right;
    }
    desc.color_format = output_format(stream, desc.color_format).ok_or_else(|| {
        error!(
            bitdepth = stream.output_bitdepth(),
            color_space = ?stream.color_space,
            "No picture format matches this frame's enhancement data"
        );
        DecoderError::error("no picture format for enhancement data")
    })?;
    out.set_desc(&desc, buffers)
}

/// Drive the engine through one enhanced decode.
fn run_engine(
    core: &mut dyn CoreDecoder,
    th: Timehandle,
    stream: &StreamDescriptor,
    s_filter_strength: f32,
    base: &mut Picture,
    intermediate: Option<&mut Picture>,
    out: &mut Picture,
) -> DecoderResult<()> {
    let mut core_base = base.to_core_image()?;
    let mut core_intermediate = intermediate.map(Picture::to_core_image).transpose()?;
    let mut core_out = out.to_core_image()?;

    if core_base.interleaving != core_out.interleaving {
        error!(
            cc = th.cc(),
            pts = th.timestamp(),
            base = ?core_base.interleaving,
            output = ?core_out.interleaving,
            "Base interleaving must match output interleaving"
        );
        return Err(DecoderError::error("base and output interleaving differ"));
    }

    if let Some(intermediate) = core_intermediate.as_mut() {
        engine_call(th, "upscale to LOQ2", core.upscale(intermediate, &core_base, Loq::Loq2))?;
    }
    let base_internal: &mut CoreImage<'_> = match core_intermediate.as_mut() {
        Some(intermediate) => intermediate,
        None => &mut core_base,
    };

    engine_call(th, "decode base LOQ", core.decode_base(base_internal))?;
    engine_call(th, "upscale", core.upscale(&mut core_out, base_internal, Loq::Loq1))?;
    if stream.s_filter_mode == SFilterMode::InLoop {
        engine_call(th, "apply s-filter in loop", core.apply_filter(&mut core_out))?;
    }
    engine_call(th, "decode top LOQ", core.decode_high(&mut core_out))?;
    if stream.s_filter_mode == SFilterMode::OutOfLoop || s_filter_strength > 0.0 {
        engine_call(th, "apply s-filter out of loop", core.apply_filter(&mut core_out))?;
    }
    Ok(())
}
