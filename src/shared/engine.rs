// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraCharacteristics, CameraConfig, CameraDevice, CameraError, CameraHal, CameraState,
    CameraStateMachine, CaptureFormat, CaptureRequest, CaptureSettings, CaptureSink,
    ErrorCategory, FramerateRange, HalEvents, HardwareEvent, ImageReader, LensFacing,
    PendingPhoto, PhotoCapabilities, PhotoTicket, PortableSettings, PreviewPipeline,
    RequestTemplate, SettingsTranslator, SinkRef, Size, event_loop::EventLoop, negotiate, photo,
    preview,
};
use alloc::sync::{Arc, Weak};
use std::{
    sync::{
        RwLock,
        atomic::{AtomicU32, Ordering},
        mpsc::{Sender, channel},
    },
    thread::JoinHandle,
};
use tracing::{debug, error, warn};

/// Everything that reaches the event-loop thread.
pub(crate) enum EngineMessage {
    Hardware(HardwareEvent),
    ScheduleRestart,
    PhotoFinished { callback_id: u64 },
    Shutdown,
}

/// Format and settings for the next session build. Replaced wholesale, never
/// edited in place.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestState {
    pub format: Option<CaptureFormat>,
    /// AE target range, in device units.
    pub ae_fps_range: Option<FramerateRange>,
    pub settings: CaptureSettings,
}

/// Resources guarded by the lifecycle lock.
#[derive(Default)]
pub(crate) struct Resources {
    pub device: Option<Box<dyn CameraDevice>>,
    pub preview: PreviewPipeline,
    pub photo: Option<PendingPhoto>,
}

impl Resources {
    /// Closes sessions and the device, and hands back what must be finished
    /// once the lock is released.
    pub fn release_all(&mut self, abort: bool) -> Teardown {
        let mut teardown = Teardown::default();
        if let Some(reader) = self.preview.close(abort) {
            teardown.readers.push(reader);
        }
        if let Some(pending) = self.photo.take() {
            teardown.push_photo(pending);
        }
        if let Some(mut device) = self.device.take() {
            debug!(camera_id = device.id(), "closing camera device");
            device.close();
        }
        teardown
    }
}

/// Work deferred until the lifecycle lock is dropped: failing photo tickets
/// notifies the sink, and joining readers may wait on sink callbacks.
#[derive(Default)]
#[must_use]
pub(crate) struct Teardown {
    pub readers: Vec<ImageReader>,
    pub tickets: Vec<Arc<PhotoTicket>>,
}

impl Teardown {
    pub fn push_photo(&mut self, pending: PendingPhoto) {
        let (ticket, reader) = pending.close();
        self.tickets.push(ticket);
        self.readers.push(reader);
    }

    pub fn finish(self) {
        for ticket in self.tickets {
            ticket.fail();
        }
        for reader in self.readers {
            reader.shutdown();
        }
    }
}

/// Rotation of delivered frames relative to the device's natural orientation.
#[derive(Clone)]
pub(crate) struct RotationSource {
    native: u32,
    invert: bool,
    device: Arc<AtomicU32>,
}

impl RotationSource {
    fn new(characteristics: &CameraCharacteristics) -> Self {
        Self {
            native: characteristics.sensor_orientation % 360,
            invert: characteristics.lens_facing == LensFacing::Back,
            device: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn degrees(&self) -> u32 {
        let device = self.device.load(Ordering::Relaxed) % 360;
        let device = if self.invert { (360 - device) % 360 } else { device };
        (self.native + device) % 360
    }
}

pub(crate) struct Shared {
    pub camera_id: String,
    pub characteristics: CameraCharacteristics,
    pub config: CameraConfig,
    pub machine: CameraStateMachine<Resources>,
    request_state: RwLock<Arc<RequestState>>,
    pub sink: SinkRef,
    pub rotation: RotationSource,
    ingress: Sender<EngineMessage>,
}

impl Shared {
    pub fn request_state(&self) -> Arc<RequestState> {
        Arc::clone(&self.request_state.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn update_request_state(&self, update: impl FnOnce(&mut RequestState)) {
        let mut slot = self.request_state.write().unwrap_or_else(|p| p.into_inner());
        let mut next = RequestState::clone(&slot);
        update(&mut next);
        *slot = Arc::new(next);
    }

    pub fn post(&self, message: EngineMessage) {
        // Only fails once the event loop has exited.
        let _ = self.ingress.send(message);
    }

    pub fn ingress(&self) -> Sender<EngineMessage> {
        self.ingress.clone()
    }

    pub fn translator(&self) -> SettingsTranslator<'_> {
        SettingsTranslator::new(&self.characteristics)
    }
}

/// Drives one camera: format negotiation, the preview stream, and photos.
///
/// All methods may be called from any thread. Only [`stop_capture`] blocks;
/// everything else reports asynchronous outcomes to the [`CaptureSink`].
///
/// [`stop_capture`]: CaptureEngine::stop_capture
pub struct CaptureEngine {
    hal: Arc<dyn CameraHal>,
    shared: Arc<Shared>,
    event_loop: Option<JoinHandle<()>>,
}

impl CaptureEngine {
    pub fn new(
        hal: Arc<dyn CameraHal>,
        camera_id: impl Into<String>,
        sink: Weak<dyn CaptureSink>,
        config: CameraConfig,
    ) -> Result<Self, CameraError> {
        config.validate()?;
        let camera_id = camera_id.into();
        let characteristics = hal.characteristics(&camera_id)?;
        debug!(
            backend = %hal.name(),
            %camera_id,
            level = %characteristics.hardware_level,
            "creating capture engine"
        );

        let (ingress, rx) = channel();
        let shared = Arc::new(Shared {
            rotation: RotationSource::new(&characteristics),
            camera_id,
            characteristics,
            config,
            machine: CameraStateMachine::new(Resources::default()),
            request_state: RwLock::new(Arc::new(RequestState::default())),
            sink: SinkRef::new(sink),
            ingress,
        });
        let event_loop = EventLoop::spawn(Arc::clone(&shared), rx)?;

        Ok(Self {
            hal,
            shared,
            event_loop: Some(event_loop),
        })
    }

    pub fn with_sink<S: CaptureSink + 'static>(
        hal: Arc<dyn CameraHal>,
        camera_id: impl Into<String>,
        sink: &Arc<S>,
        config: CameraConfig,
    ) -> Result<Self, CameraError> {
        let sink = Arc::downgrade(sink) as Weak<dyn CaptureSink>;
        Self::new(hal, camera_id, sink, config)
    }

    pub fn camera_id(&self) -> &str {
        &self.shared.camera_id
    }

    pub fn state(&self) -> CameraState {
        self.shared.machine.state()
    }

    pub fn capture_format(&self) -> Option<CaptureFormat> {
        self.shared.request_state().format
    }

    pub fn characteristics(&self) -> &CameraCharacteristics {
        &self.shared.characteristics
    }

    /// Negotiates the capture format closest to the request.
    pub fn allocate(&self, width: u32, height: u32, frame_rate: u32) -> bool {
        debug!(width, height, frame_rate, "allocate");
        match self.try_allocate(width, height, frame_rate) {
            Ok(format) => {
                debug!(%format, "allocated capture format");
                true
            },
            Err(err) => {
                log_rejected("allocate", &err);
                false
            },
        }
    }

    pub(crate) fn try_allocate(
        &self,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<CaptureFormat, CameraError> {
        let state = self.state();
        if state.is_settling() {
            return Err(CameraError::Busy(state));
        }
        let negotiated = negotiate(&self.shared.characteristics, width, height, frame_rate)?;
        self.shared.update_request_state(|request_state| {
            request_state.format = Some(negotiated.format);
            request_state.ae_fps_range = Some(negotiated.ae_fps_range);
        });
        Ok(negotiated.format)
    }

    /// Requests the device open. The preview starts asynchronously and is
    /// announced through [`CaptureSink::on_started`].
    pub fn start_capture(&self) -> bool {
        debug!(camera_id = %self.shared.camera_id, "start capture");
        match self.try_start() {
            Ok(()) => true,
            Err(err) => {
                log_rejected("start capture", &err);
                false
            },
        }
    }

    fn try_start(&self) -> Result<(), CameraError> {
        if self.shared.request_state().format.is_none() {
            return Err(CameraError::NotConfigured);
        }
        let mut lifecycle = self.shared.machine.begin_opening()?;
        let events = HalEvents::new(self.shared.ingress());
        if let Err(err) = self.hal.open_camera(&self.shared.camera_id, events) {
            self.shared
                .machine
                .transition(&mut lifecycle, CameraState::Stopped);
            return Err(err);
        }
        Ok(())
    }

    /// Tears down every session and closes the device, blocking while an
    /// open is still settling. Returns `true` once stopped.
    pub fn stop_capture(&self) -> bool {
        debug!(camera_id = %self.shared.camera_id, "stop capture");
        let mut lifecycle = self.shared.machine.wait_settled();
        if lifecycle.state() == CameraState::Stopped {
            return true;
        }

        let had_device = lifecycle.device.is_some();
        let teardown = lifecycle.release_all(true);
        self.shared
            .machine
            .transition(&mut lifecycle, CameraState::Stopped);
        drop(lifecycle);

        self.shared.update_request_state(|request_state| {
            request_state.settings = request_state.settings.without_crop();
        });
        teardown.finish();

        if !had_device {
            warn!("stop capture found no open device");
        }
        had_device
    }

    pub fn photo_capabilities(&self) -> PhotoCapabilities {
        let request_state = self.shared.request_state();
        let running = self.shared.machine.lock().preview.current_request();
        let request = running.unwrap_or_else(|| {
            let mut request = CaptureRequest::new(RequestTemplate::Preview);
            preview::apply_defaults(&mut request);
            self.shared.translator().configure(
                &request_state.settings,
                request_state.ae_fps_range,
                &mut request,
            );
            request
        });

        let format_size = request_state
            .format
            .map(|format| format.size())
            .unwrap_or_default();
        let settings = &request_state.settings;
        let photo_size = Size::new(
            if settings.photo_width > 0 {
                settings.photo_width
            } else {
                format_size.width
            },
            if settings.photo_height > 0 {
                settings.photo_height
            } else {
                format_size.height
            },
        );
        PhotoCapabilities::derive(&self.shared.characteristics, &request, photo_size)
    }

    /// Folds `options` into the current settings and schedules a preview
    /// rebuild. Bursts of calls produce a single rebuild.
    pub fn set_photo_options(&self, options: &PortableSettings) {
        debug!(?options, "set photo options");
        let translator = self.shared.translator();
        self.shared.update_request_state(|request_state| {
            request_state.settings = translator.apply(&request_state.settings, options);
        });
        self.shared.post(EngineMessage::ScheduleRestart);
    }

    /// Starts a still capture. On `true`, exactly one
    /// [`CaptureSink::on_photo_taken`] follows for `callback_id`; on `false`,
    /// none does.
    pub fn take_photo(&self, callback_id: u64) -> bool {
        debug!(callback_id, "take photo");
        match photo::take_photo(&self.shared, callback_id) {
            Ok(()) => true,
            Err(err) => {
                log_rejected("take photo", &err);
                false
            },
        }
    }

    /// Sets the current display rotation, in degrees clockwise.
    pub fn set_device_rotation(&self, degrees: u32) {
        self.shared
            .rotation
            .device
            .store(degrees % 360, Ordering::Relaxed);
    }

    pub fn frame_rotation(&self) -> u32 {
        self.shared.rotation.degrees()
    }
}

/// Caller mistakes are warnings; hardware failures are errors.
fn log_rejected(operation: &'static str, err: &CameraError) {
    match err.category() {
        ErrorCategory::Usage => warn!(operation, %err, "request rejected"),
        category => error!(operation, %category, %err, "request failed"),
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop_capture();
        self.shared.post(EngineMessage::Shutdown);
        if let Some(event_loop) = self.event_loop.take() {
            if event_loop.join().is_err() {
                warn!("camera event loop panicked");
            }
        }
    }
}
