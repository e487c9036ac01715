//! Enhancement data bridging: raw payloads arrive in any order through
//! [`LcevcProcessor::insert`], and are parsed on demand, in timehandle order,
//! by [`LcevcProcessor::extract`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use lcevc_common::{DecoderError, DecoderResult, Timehandle};
use tracing::{debug, error, trace, warn};

use crate::core::{CoreDecoder, CoreImage, StreamDescriptor, SurfaceFormat};

/// A raw enhancement payload waiting to be parsed.
struct UnprocessedEntry {
    data: Vec<u8>,
    arrival: Instant,
}

/// Capacity-bounded, timehandle-ordered store of raw payloads.
struct UnprocessedContainer {
    entries: BTreeMap<Timehandle, UnprocessedEntry>,
    capacity: usize,
}

impl UnprocessedContainer {
    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    fn pop_first(&mut self) -> Option<(Timehandle, UnprocessedEntry)> {
        self.entries.pop_first()
    }
}

#[derive(Default)]
pub struct LcevcProcessor {
    unprocessed: Option<UnprocessedContainer>,
    processed: HashMap<Timehandle, Arc<StreamDescriptor>>,
    /// `pss_surface_fp_setting`: -1 picks the surface format per stream.
    surface_fp_setting: i32,
    temporal_accumulations: u64,
}

impl LcevcProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the unprocessed container. Payloads cannot be inserted before
    /// this is called.
    pub fn initialise(&mut self, unprocessed_capacity: usize, surface_fp_setting: i32) {
        self.unprocessed = Some(UnprocessedContainer {
            entries: BTreeMap::new(),
            capacity: unprocessed_capacity,
        });
        self.surface_fp_setting = surface_fp_setting;
    }

    pub fn release(&mut self) {
        self.unprocessed = None;
        self.processed.clear();
    }

    /// Drop every payload not yet matched with a base, parsed or not.
    pub fn flush(&mut self) {
        if let Some(container) = &mut self.unprocessed {
            container.entries.clear();
        }
        self.processed.clear();
    }

    /// Store a raw payload for later parsing.
    ///
    /// # Errors
    ///
    /// `Uninitialized` before [`initialise`](Self::initialise); `Error` if a
    /// payload with the same timehandle is already queued.
    pub fn insert(&mut self, data: &[u8], timehandle: Timehandle, arrival: Instant) -> DecoderResult<()> {
        let Some(container) = &mut self.unprocessed else {
            error!("Fed enhancement data before the enhancement container was initialised");
            return Err(DecoderError::Uninitialized);
        };
        if container.entries.contains_key(&timehandle) {
            error!(
                cc = timehandle.cc(),
                pts = timehandle.timestamp(),
                "Failed to insert enhancement data, duplicate timehandle"
            );
            return Err(DecoderError::error("duplicate enhancement timehandle"));
        }
        if container.is_full() {
            debug!(capacity = container.capacity, "Enhancement container is full");
            return Err(DecoderError::Again);
        }
        container.entries.insert(
            timehandle,
            UnprocessedEntry {
                data: data.to_vec(),
                arrival,
            },
        );
        Ok(())
    }

    /// Parsed enhancement data for `timehandle`.
    ///
    /// Earlier payloads still queued are parsed on the way and fed to the
    /// engine without an output picture, so that its temporal state follows
    /// the stream even across frames that are never decoded. With `discard`
    /// set, nothing is kept for later lookups; otherwise every payload parsed
    /// here stays cached until extracted with `discard`.
    pub fn extract(
        &mut self,
        core: &mut dyn CoreDecoder,
        timehandle: Timehandle,
        discard: bool,
    ) -> Option<Arc<StreamDescriptor>> {
        if discard {
            let cached = self.processed.remove(&timehandle);
            // Anything cached before this frame can no longer be matched.
            self.processed.retain(|th, _| *th > timehandle);
            if cached.is_some() {
                return cached;
            }
        } else if let Some(stream) = self.processed.get(&timehandle) {
            return Some(Arc::clone(stream));
        }
        self.process_up_to(core, timehandle, discard)
    }

    fn process_up_to(
        &mut self,
        core: &mut dyn CoreDecoder,
        target: Timehandle,
        discard: bool,
    ) -> Option<Arc<StreamDescriptor>> {
        let mut processed = 0u32;
        let mut last = Timehandle::INVALID;
        let mut found = None;

        loop {
            let next = self
                .unprocessed
                .as_mut()
                .and_then(UnprocessedContainer::pop_first);
            let Some((timehandle, entry)) = next else {
                break;
            };
            last = timehandle;
            processed += 1;
            trace!(
                cc = timehandle.cc(),
                pts = timehandle.timestamp(),
                waited_us = entry.arrival.elapsed().as_micros() as u64,
                "Parsing enhancement data"
            );

            let stream = match core.parse(&entry.data) {
                Ok(stream) => Arc::new(stream),
                Err(e) => {
                    error!(
                        cc = timehandle.cc(),
                        pts = timehandle.timestamp(),
                        error = %e,
                        "Failed to parse enhancement data"
                    );
                    return None;
                }
            };

            let format = SurfaceFormat::for_stream(&stream, self.surface_fp_setting);
            if let Err(e) = core.set_live_config(format) {
                warn!(cc = timehandle.cc(), pts = timehandle.timestamp(), error = %e, "Failed to set live config");
            }

            if timehandle < target {
                self.accumulate_temporal(core, timehandle, &stream);
            }
            if !discard {
                self.processed.insert(timehandle, Arc::clone(&stream));
            }
            if timehandle >= target {
                found = Some(stream);
                break;
            }
        }

        match found {
            Some(stream) if last == target => {
                if processed > 1 {
                    debug!(
                        cc = target.cc(),
                        pts = target.timestamp(),
                        processed,
                        "Processed several payloads to reach this frame's enhancement data"
                    );
                }
                Some(stream)
            }
            _ => {
                warn!(
                    cc = target.cc(),
                    pts = target.timestamp(),
                    last_cc = last.is_valid().then(|| last.cc()),
                    last_pts = last.is_valid().then(|| last.timestamp()),
                    processed,
                    "Could not find enhancement data"
                );
                None
            }
        }
    }

    /// Run a skipped frame's residuals through the engine without output.
    fn accumulate_temporal(&mut self, core: &mut dyn CoreDecoder, timehandle: Timehandle, stream: &StreamDescriptor) {
        let mut image = CoreImage::empty(stream.global_width, stream.global_height);
        match core.decode_high(&mut image) {
            Ok(()) => self.temporal_accumulations += 1,
            Err(e) => error!(
                cc = timehandle.cc(),
                pts = timehandle.timestamp(),
                error = %e,
                "Failed to skip and accumulate temporal residuals"
            ),
        }
    }

    pub fn unprocessed_capacity(&self) -> usize {
        self.unprocessed.as_ref().map_or(0, |c| c.capacity)
    }

    pub fn unprocessed_len(&self) -> usize {
        self.unprocessed.as_ref().map_or(0, |c| c.entries.len())
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_unprocessed_full(&self) -> bool {
        self.unprocessed.as_ref().is_some_and(UnprocessedContainer::is_full)
    }

    /// Skipped frames whose residuals were accumulated without output.
    pub fn temporal_accumulations(&self) -> u64 {
        self.temporal_accumulations
    }
}
