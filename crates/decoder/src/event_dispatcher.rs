//! Event delivery on a dedicated thread.
//!
//! Events are generated from inside decoder calls but delivered from the
//! dispatcher's own thread, strictly in generation order. A callback may
//! therefore call back into the decoder without deadlocking on the lock held
//! by the call that raised the event.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use lcevc_common::{DecodeInformation, DecoderError, DecoderResult, EventKind, Handle};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::decoder::DecoderHandle;
use crate::picture::Picture;

/// One event as handed to the callback.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub picture: Option<Handle<Picture>>,
    pub decode_info: Option<DecodeInformation>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            picture: None,
            decode_info: None,
        }
    }

    pub fn with_picture(mut self, picture: Handle<Picture>) -> Self {
        self.picture = Some(picture);
        self
    }

    pub fn with_decode_info(mut self, info: DecodeInformation) -> Self {
        self.decode_info = Some(info);
        self
    }
}

/// User callback. Runs on the dispatcher thread.
pub type EventCallback = Box<dyn FnMut(DecoderHandle, &Event) + Send>;

enum DispatchMessage {
    Event(Event),
    /// Drains everything queued before it, then stops the thread.
    Flush,
}

pub struct EventDispatcher {
    decoder: DecoderHandle,
    enabled: u16,
    callback: Arc<Mutex<Option<EventCallback>>>,
    sender: Option<Sender<DispatchMessage>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EventDispatcher {
    /// A dispatcher for `decoder`. No thread runs until [`start`](Self::start).
    pub fn new(decoder: DecoderHandle) -> Self {
        Self {
            decoder,
            enabled: 0,
            callback: Arc::new(Mutex::new(None)),
            sender: None,
            thread: None,
        }
    }

    /// Handle reported to the callback. Only takes effect at the next
    /// [`start`](Self::start).
    pub fn set_decoder(&mut self, decoder: DecoderHandle) {
        self.decoder = decoder;
    }

    /// Replace the callback. Takes effect for the next delivered event.
    pub fn set_callback(&self, callback: Option<EventCallback>) {
        *self.callback.lock() = callback;
    }

    /// Spawn the delivery thread with a fixed set of enabled event kinds
    /// (a mask of [`EventKind::mask_bit`]s).
    ///
    /// # Errors
    ///
    /// Fails if the dispatcher is already running or the thread cannot be
    /// spawned.
    pub fn start(&mut self, enabled: u16) -> DecoderResult<()> {
        if self.thread.is_some() {
            return Err(DecoderError::Initialized);
        }
        let (tx, rx) = channel::unbounded::<DispatchMessage>();
        let callback = Arc::clone(&self.callback);
        let decoder = self.decoder;
        let handle = thread::Builder::new()
            .name("lcevc-events".to_string())
            .spawn(move || event_loop(decoder, rx, callback))
            .map_err(|e| DecoderError::error(format!("failed to spawn event thread: {e}")))?;

        self.enabled = enabled;
        self.sender = Some(tx);
        self.thread = Some(handle);
        debug!(enabled = format_args!("{enabled:#06x}"), "Event dispatcher started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.enabled & kind.mask_bit() != 0
    }

    /// Queue `event` for delivery if its kind is enabled.
    pub fn generate(&self, event: Event) {
        if !self.is_enabled(event.kind) {
            return;
        }
        let Some(sender) = &self.sender else {
            return;
        };
        trace!(kind = ?event.kind, "Queue event");
        if sender.send(DispatchMessage::Event(event)).is_err() {
            warn!("Event thread has gone, dropping event");
        }
    }

    pub fn generate_kind(&self, kind: EventKind) {
        self.generate(Event::new(kind));
    }

    /// Deliver everything still queued, then stop the thread. Safe to call
    /// more than once.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if let Some(sender) = self.sender.take() {
            // Flush is always queued, whatever the enabled mask.
            let _ = sender.send(DispatchMessage::Flush);
        }
        // Dropped from inside a callback: the thread stops on its own once it
        // reaches the flush.
        if handle.thread().id() == thread::current().id() {
            debug!("Event dispatcher stopping from its own thread");
            return;
        }
        if handle.join().is_err() {
            warn!("Event thread panicked");
        }
        debug!("Event dispatcher stopped");
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn event_loop(
    decoder: DecoderHandle,
    rx: Receiver<DispatchMessage>,
    callback: Arc<Mutex<Option<EventCallback>>>,
) {
    while let Ok(message) = rx.recv() {
        match message {
            DispatchMessage::Event(event) => {
                if let Some(callback) = callback.lock().as_mut() {
                    callback(decoder, &event);
                }
            }
            DispatchMessage::Flush => break,
        }
    }
}
