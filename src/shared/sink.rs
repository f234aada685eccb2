// This is free and unencumbered software released into the public domain.

use crate::shared::Frame;
use alloc::sync::Weak;
use bytes::Bytes;
use tracing::trace;

/// Consumer of everything the engine produces.
///
/// Callbacks arrive on engine threads and must not block for long. Frame
/// callbacks run on the preview worker, one at a time and in hardware order.
pub trait CaptureSink: Send + Sync {
    fn on_started(&self) {}

    fn on_error(&self, message: &str);

    fn on_frame_available(&self, frame: &Frame);

    /// `data` is empty when the photo failed.
    fn on_photo_taken(&self, callback_id: u64, data: Bytes);
}

/// Non-owning handle to the sink; notifications to a dropped sink are discarded.
#[derive(Clone)]
pub(crate) struct SinkRef(Weak<dyn CaptureSink>);

impl SinkRef {
    pub(crate) fn new(sink: Weak<dyn CaptureSink>) -> Self {
        Self(sink)
    }

    pub(crate) fn started(&self) {
        match self.0.upgrade() {
            Some(sink) => sink.on_started(),
            None => trace!("sink gone; dropping started"),
        }
    }

    pub(crate) fn error(&self, message: &str) {
        match self.0.upgrade() {
            Some(sink) => sink.on_error(message),
            None => trace!(message, "sink gone; dropping error"),
        }
    }

    pub(crate) fn frame(&self, frame: &Frame) {
        if let Some(sink) = self.0.upgrade() {
            sink.on_frame_available(frame);
        }
    }

    pub(crate) fn photo_taken(&self, callback_id: u64, data: Bytes) {
        match self.0.upgrade() {
            Some(sink) => sink.on_photo_taken(callback_id, data),
            None => trace!(callback_id, "sink gone; dropping photo"),
        }
    }
}
