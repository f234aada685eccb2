// This is free and unencumbered software released into the public domain.

use crate::shared::{
    Acquired, CameraError, CameraState, CaptureRequest, CaptureSession, EngineMessage, Image,
    ImageReader, PixelFormat, RequestTemplate, SessionContext, Shared, SinkRef, closest_size,
    preview,
};
use alloc::sync::Arc;
use bytes::Bytes;
use core::ops::ControlFlow;
use scopeguard::ScopeGuard;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

const PHOTO_POLL: Duration = Duration::from_millis(100);

/// Resolves a photo request exactly once.
///
/// Whichever of success, failure, or drop comes first notifies the sink and
/// tells the event loop the photo is over; later attempts are ignored.
pub(crate) struct PhotoTicket {
    callback_id: u64,
    sink: SinkRef,
    ingress: Sender<EngineMessage>,
    resolved: AtomicBool,
}

impl PhotoTicket {
    fn new(callback_id: u64, sink: SinkRef, ingress: Sender<EngineMessage>) -> Self {
        Self {
            callback_id,
            sink,
            ingress,
            resolved: AtomicBool::new(false),
        }
    }

    pub fn deliver(&self, data: Bytes) {
        self.resolve(data);
    }

    pub fn fail(&self) {
        self.resolve(Bytes::new());
    }

    /// Retires the ticket silently, for a request that was never accepted.
    fn cancel(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    fn resolve(&self, data: Bytes) {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(callback_id = self.callback_id, len = data.len(), "photo taken");
        self.sink.photo_taken(self.callback_id, data);
        let _ = self.ingress.send(EngineMessage::PhotoFinished {
            callback_id: self.callback_id,
        });
    }
}

impl Drop for PhotoTicket {
    fn drop(&mut self) {
        self.fail();
    }
}

/// An accepted photo that has not yet handed the device back to preview.
pub(crate) struct PendingPhoto {
    callback_id: u64,
    ticket: Arc<PhotoTicket>,
    reader: ImageReader,
    session: Option<Box<dyn CaptureSession>>,
}

impl PendingPhoto {
    /// Closes the photo session, returning the ticket and reader for the
    /// caller to finish outside the lifecycle lock.
    pub fn close(mut self) -> (Arc<PhotoTicket>, ImageReader) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        (self.ticket, self.reader)
    }
}

pub(crate) fn take_photo(shared: &Shared, callback_id: u64) -> Result<(), CameraError> {
    let mut lifecycle = shared.machine.lock();
    if lifecycle.state() != CameraState::Started || lifecycle.device.is_none() {
        return Err(CameraError::NotStarted);
    }
    if lifecycle.photo.is_some() {
        return Err(CameraError::PhotoPending);
    }

    let request_state = shared.request_state();
    let format = request_state.format.ok_or(CameraError::NotConfigured)?;
    let settings = &request_state.settings;
    let sizes = shared.characteristics.output_sizes(PixelFormat::Jpeg);
    let size = closest_size(&sizes, settings.photo_width, settings.photo_height)
        .unwrap_or_else(|| format.size());
    debug!(callback_id, %size, "photo size");

    // Until the session request is accepted the photo is not ours to report.
    let ticket = scopeguard::guard(
        Arc::new(PhotoTicket::new(callback_id, shared.sink.clone(), shared.ingress())),
        |ticket| ticket.cancel(),
    );
    let reader = ImageReader::spawn(
        "camera-photo",
        size,
        PixelFormat::Jpeg,
        1,
        PHOTO_POLL,
        photo_listener(Arc::clone(&ticket), shared.config.photo_timeout),
    )?;

    let mut request = CaptureRequest::new(RequestTemplate::StillCapture);
    request.tag = Some(callback_id);
    request.add_target(reader.surface());
    request.jpeg_orientation = Some(shared.rotation.degrees());
    shared.translator().configure(settings, request_state.ae_fps_range, &mut request);

    let device = lifecycle.device.as_mut().ok_or(CameraError::NotStarted)?;
    device.create_capture_session(
        vec![reader.surface()],
        SessionContext::Photo {
            request,
            callback_id,
        },
    )?;
    let ticket = ScopeGuard::into_inner(ticket);

    // The preview session stays configured but idle while the still owns the device.
    if let Some(session) = lifecycle.preview.session_mut() {
        if let Err(err) = session.stop_repeating() {
            warn!(%err, "stop repeating failed");
        }
    }
    lifecycle.photo = Some(PendingPhoto {
        callback_id,
        ticket,
        reader,
        session: None,
    });
    Ok(())
}

/// Receives the single still image; runs on the photo reader's worker.
fn photo_listener(
    ticket: Arc<PhotoTicket>,
    timeout: Duration,
) -> impl FnMut(Acquired) -> ControlFlow<()> + Send + 'static {
    let deadline = Instant::now() + timeout;
    move |acquired| {
        match acquired {
            Acquired::Image(image) => match read_captured_data(&image) {
                Ok(data) => ticket.deliver(data),
                Err(err) => {
                    error!(%err, "photo image rejected");
                    ticket.fail();
                },
            },
            Acquired::TimedOut if Instant::now() < deadline => {
                return ControlFlow::Continue(());
            },
            Acquired::TimedOut => {
                error!(?timeout, "timed out waiting for the photo image");
                ticket.fail();
            },
        }
        ControlFlow::Break(())
    }
}

/// Copies the encoded payload out of the image's buffer.
pub(crate) fn read_captured_data(image: &Image) -> Result<Bytes, CameraError> {
    if image.format != PixelFormat::Jpeg {
        return Err(CameraError::protocol(format!(
            "Unexpected image format: {}",
            image.format
        )));
    }
    let plane = image
        .planes
        .first()
        .ok_or_else(|| CameraError::protocol("photo image has no planes"))?;
    if plane.data.is_empty() {
        return Err(CameraError::protocol("photo image is empty"));
    }
    Ok(Bytes::copy_from_slice(&plane.data))
}

fn pending_ticket(shared: &Shared, callback_id: Option<u64>) -> Option<Arc<PhotoTicket>> {
    let lifecycle = shared.machine.lock();
    lifecycle
        .photo
        .as_ref()
        .filter(|pending| Some(pending.callback_id) == callback_id)
        .map(|pending| Arc::clone(&pending.ticket))
}

/// The device configured the photo session: submit the single capture.
pub(crate) fn on_session_configured(
    shared: &Shared,
    mut session: Box<dyn CaptureSession>,
    request: CaptureRequest,
    callback_id: u64,
) {
    let mut lifecycle = shared.machine.lock();
    let Some(pending) = lifecycle
        .photo
        .as_mut()
        .filter(|pending| pending.callback_id == callback_id)
    else {
        warn!(callback_id, "discarding stale photo session");
        session.close();
        return;
    };

    match session.capture(&request) {
        Ok(()) => pending.session = Some(session),
        Err(err) => {
            error!(callback_id, %err, "photo capture failed");
            session.close();
            let ticket = Arc::clone(&pending.ticket);
            drop(lifecycle);
            ticket.fail();
        },
    }
}

pub(crate) fn on_session_configure_failed(shared: &Shared, callback_id: u64) {
    let err = CameraError::configuration("photo session");
    error!(callback_id, %err, "photo session configuration failed");
    if let Some(ticket) = pending_ticket(shared, Some(callback_id)) {
        ticket.fail();
    }
}

pub(crate) fn on_capture_failed(shared: &Shared, tag: Option<u64>) {
    error!(tag, "capture failed");
    if let Some(ticket) = pending_ticket(shared, tag) {
        ticket.fail();
    }
}

/// The photo resolved: release its session and bring the preview back with
/// the settings now in force.
pub(crate) fn on_photo_finished(shared: &Shared, callback_id: u64) {
    let mut lifecycle = shared.machine.lock();
    let Some(pending) = lifecycle
        .photo
        .take_if(|pending| pending.callback_id == callback_id)
    else {
        debug!(callback_id, "photo already torn down");
        return;
    };
    let (_ticket, photo_reader) = pending.close();

    let mut replaced = None;
    let mut failure = None;
    if lifecycle.state() == CameraState::Started && lifecycle.device.is_some() {
        lifecycle.preview.close_session();
        match preview::create_preview_objects(shared, &mut lifecycle) {
            Ok(reader) => replaced = reader,
            Err(err) => {
                error!(%err, "preview restart after photo failed");
                failure = Some(preview::stop_all(shared, &mut lifecycle));
            },
        }
    }
    drop(lifecycle);

    photo_reader.shutdown();
    if let Some(reader) = replaced {
        reader.shutdown();
    }
    if let Some(teardown) = failure {
        teardown.finish();
        shared.sink.error("Error restarting preview");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{ErrorCategory, Plane};
    use std::sync::mpsc::channel;

    fn image(format: PixelFormat, data: &'static [u8]) -> Image {
        Image {
            format,
            width: 2,
            height: 2,
            planes: vec![Plane {
                data: Bytes::from_static(data),
                row_stride: 0,
                pixel_stride: 0,
            }],
            timestamp_ns: 0,
        }
    }

    #[test]
    fn jpeg_payload_is_copied_out() {
        let data = read_captured_data(&image(PixelFormat::Jpeg, b"\xff\xd8\xff\xd9")).unwrap();
        assert_eq!(&data[..], b"\xff\xd8\xff\xd9");
    }

    #[test]
    fn wrong_format_is_rejected() {
        let err = read_captured_data(&image(PixelFormat::Yuv420, b"yuv")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(read_captured_data(&image(PixelFormat::Jpeg, b"")).is_err());
    }

    #[test]
    fn ticket_resolves_once_then_announces_completion() {
        use crate::shared::{CaptureSink, Frame};
        use std::sync::Mutex;

        #[derive(Default)]
        struct Photos(Mutex<Vec<(u64, usize)>>);

        impl CaptureSink for Photos {
            fn on_error(&self, _message: &str) {}
            fn on_frame_available(&self, _frame: &Frame) {}
            fn on_photo_taken(&self, callback_id: u64, data: Bytes) {
                self.0.lock().unwrap().push((callback_id, data.len()));
            }
        }

        let sink = Arc::new(Photos::default());
        let weak = Arc::downgrade(&sink) as alloc::sync::Weak<dyn CaptureSink>;
        let (tx, rx) = channel();

        let ticket = PhotoTicket::new(7, SinkRef::new(weak.clone()), tx.clone());
        ticket.deliver(Bytes::from_static(b"jpeg"));
        ticket.fail();
        drop(ticket);

        let dropped = PhotoTicket::new(8, SinkRef::new(weak.clone()), tx.clone());
        drop(dropped);

        let cancelled = PhotoTicket::new(9, SinkRef::new(weak), tx);
        cancelled.cancel();
        drop(cancelled);

        assert_eq!(*sink.0.lock().unwrap(), vec![(7, 4), (8, 0)]);
        let finished: Vec<u64> = rx
            .try_iter()
            .filter_map(|message| match message {
                EngineMessage::PhotoFinished { callback_id } => Some(callback_id),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![7, 8]);
    }
}
