// This is free and unencumbered software released into the public domain.

//! An in-process camera backend.
//!
//! Behaves like a Camera2 device: opening and session configuration complete
//! asynchronously on their own threads, a repeating request streams planar
//! YUV frames at the request's target rate, and a still capture yields a
//! real JPEG. Every failure the engine must survive can be injected through
//! [`SimulatedFaults`], and every call the engine makes is recorded.

use crate::shared::{
    CameraCharacteristics, CameraDevice, CameraError, CameraHal, CaptureRequest, CaptureSession,
    FramerateRange, HalEvents, HardwareLevel, Image, ImageSurface, LensFacing, PixelFormat, Plane,
    Rect, RequestCapability, SessionContext, Size, StreamConfiguration, SurfaceError,
};
use alloc::{borrow::Cow, sync::Arc};
use bytes::Bytes;
use image::{Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use std::{
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);
const JPEG_QUALITY: u8 = 85;

/// How `open_camera` behaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenBehavior {
    #[default]
    Succeed,
    /// `open_camera` itself fails, as when the device is in use.
    Reject,
    /// Opening fails later with this device error code.
    Error(i32),
    /// Nothing is ever reported.
    Hang,
}

/// How a still capture behaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PhotoBehavior {
    #[default]
    Jpeg,
    /// Delivers a YUV image instead of a JPEG.
    WrongFormat,
    /// Reports a capture failure for the request.
    CaptureError,
    /// Accepts the capture and never produces an image.
    NoImage,
    /// `capture` itself fails.
    Reject,
}

#[derive(Clone, Debug, Default)]
pub struct SimulatedFaults {
    pub open: OpenBehavior,
    pub open_delay: Duration,
    pub configure_delay: Duration,
    pub capture_delay: Duration,
    pub fail_preview_configure: bool,
    pub fail_photo_configure: bool,
    pub fail_repeating: bool,
    /// Rejects session creation synchronously, as a revoked surface would.
    pub fail_create_session: bool,
    pub photo: PhotoBehavior,
    /// Sequence numbers, counted across all repeating streams, of frames
    /// whose declared size is wrong.
    pub mismatched_frames: Vec<u64>,
    /// Overrides the interval derived from the request's target FPS range.
    pub frame_interval: Option<Duration>,
}

/// A call the engine made into the backend.
#[derive(Clone, Debug)]
pub enum SimulatedCall {
    OpenCamera(String),
    CreateSession { surfaces: Vec<u64>, photo: bool },
    SetRepeating(CaptureRequest),
    StopRepeating,
    Capture(CaptureRequest),
    AbortCaptures,
    CloseSession,
    CloseDevice,
}

#[derive(Default)]
struct Control {
    faults: Mutex<SimulatedFaults>,
    calls: Mutex<Vec<SimulatedCall>>,
    open_device: Mutex<Option<HalEvents>>,
    frame_sequence: AtomicU64,
}

impl Control {
    fn faults(&self) -> SimulatedFaults {
        lock(&self.faults).clone()
    }

    fn record(&self, call: SimulatedCall) {
        trace!(?call, "simulated call");
        lock(&self.calls).push(call);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

fn spawn_named(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>, CameraError> {
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map_err(|e| CameraError::driver("spawning simulated camera thread", e))
}

#[derive(Clone, Debug)]
struct SimulatedCamera {
    id: String,
    characteristics: CameraCharacteristics,
}

/// The characteristics of a typical back-facing FULL-level camera.
pub fn default_characteristics() -> CameraCharacteristics {
    let stream = |format, width, height| StreamConfiguration {
        format,
        size: Size::new(width, height),
        min_frame_duration_ns: 33_333_333,
    };
    CameraCharacteristics {
        hardware_level: HardwareLevel::Full,
        lens_facing: LensFacing::Back,
        sensor_orientation: 90,
        active_array: Rect::new(0, 0, 2560, 1920),
        max_digital_zoom: 8.0,
        stream_configurations: vec![
            stream(PixelFormat::Yuv420, 1280, 720),
            stream(PixelFormat::Yuv420, 640, 480),
            stream(PixelFormat::Yuv420, 320, 240),
            stream(PixelFormat::Jpeg, 1280, 960),
            stream(PixelFormat::Jpeg, 640, 480),
            stream(PixelFormat::Jpeg, 320, 240),
        ],
        capabilities: vec![
            RequestCapability::BackwardCompatible,
            RequestCapability::ManualSensor,
        ],
        ae_target_fps_ranges: vec![FramerateRange::new(15, 30), FramerateRange::new(30, 30)],
        max_regions_af: 1,
        max_regions_ae: 1,
        max_regions_awb: 1,
        sensitivity_range: Some((100, 3200)),
        ae_compensation_step: 1.0 / 3.0,
        ae_compensation_range: (-6, 6),
        flash_available: true,
    }
}

#[derive(Clone, Default)]
pub struct SimulatedHal {
    cameras: Vec<SimulatedCamera>,
    control: Arc<Control>,
}

impl SimulatedHal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(
        mut self,
        id: impl Into<String>,
        characteristics: CameraCharacteristics,
    ) -> Self {
        self.cameras.push(SimulatedCamera {
            id: id.into(),
            characteristics,
        });
        self
    }

    pub fn with_faults(self, faults: SimulatedFaults) -> Self {
        self.set_faults(faults);
        self
    }

    pub fn set_faults(&self, faults: SimulatedFaults) {
        *lock(&self.control.faults) = faults;
    }

    pub fn update_faults(&self, update: impl FnOnce(&mut SimulatedFaults)) {
        update(&mut lock(&self.control.faults));
    }

    pub fn calls(&self) -> Vec<SimulatedCall> {
        lock(&self.control.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.control.calls).clear();
    }

    /// Repeating requests submitted so far, oldest first.
    pub fn repeating_requests(&self) -> Vec<CaptureRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SimulatedCall::SetRepeating(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Simulates the device being unplugged or revoked.
    pub fn disconnect(&self) {
        if let Some(events) = lock(&self.control.open_device).take() {
            debug!("simulating disconnect");
            events.device_disconnected();
        }
    }

    /// Simulates a fatal device error.
    pub fn fail_device(&self, code: i32) {
        if let Some(events) = lock(&self.control.open_device).take() {
            debug!(code, "simulating device error");
            events.device_error(code);
        }
    }

    fn camera(&self, camera_id: &str) -> Result<&SimulatedCamera, CameraError> {
        self.cameras
            .iter()
            .find(|camera| camera.id == camera_id)
            .ok_or(CameraError::NoCamera)
    }
}

impl dogma::Named for SimulatedHal {
    fn name(&self) -> Cow<'_, str> {
        "simulated".into()
    }
}

impl CameraHal for SimulatedHal {
    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        Ok(self.cameras.iter().map(|camera| camera.id.clone()).collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        Ok(self.camera(camera_id)?.characteristics.clone())
    }

    fn open_camera(&self, camera_id: &str, events: HalEvents) -> Result<(), CameraError> {
        let camera = self.camera(camera_id)?;
        self.control.record(SimulatedCall::OpenCamera(camera.id.clone()));

        let faults = self.control.faults();
        if faults.open == OpenBehavior::Reject {
            return Err(CameraError::access(format!("camera {camera_id} is in use")));
        }

        let control = Arc::clone(&self.control);
        let id = camera.id.clone();
        spawn_named("sim-open", move || {
            thread::sleep(faults.open_delay);
            match faults.open {
                OpenBehavior::Succeed => {
                    *lock(&control.open_device) = Some(events.clone());
                    events.device_opened(Box::new(SimulatedDevice {
                        id,
                        control,
                        events: events.clone(),
                        closed: false,
                    }));
                },
                OpenBehavior::Error(code) => events.device_error(code),
                OpenBehavior::Reject | OpenBehavior::Hang => {},
            }
        })?;
        Ok(())
    }
}

struct SimulatedDevice {
    id: String,
    control: Arc<Control>,
    events: HalEvents,
    closed: bool,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: Vec<ImageSurface>,
        context: SessionContext,
    ) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::access("camera device was closed"));
        }
        self.control.record(SimulatedCall::CreateSession {
            surfaces: outputs.iter().map(ImageSurface::id).collect(),
            photo: context.is_photo(),
        });

        let faults = self.control.faults();
        if faults.fail_create_session {
            return Err(CameraError::access("capture session rejected"));
        }
        let fail = if context.is_photo() {
            faults.fail_photo_configure
        } else {
            faults.fail_preview_configure
        };
        let control = Arc::clone(&self.control);
        let events = self.events.clone();
        spawn_named("sim-configure", move || {
            thread::sleep(faults.configure_delay);
            if fail {
                events.session_configure_failed(context);
            } else {
                let session = SimulatedSession {
                    control,
                    events: events.clone(),
                    stream: None,
                    closed: false,
                };
                events.session_configured(Box::new(session), context);
            }
        })?;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.control.record(SimulatedCall::CloseDevice);
            lock(&self.control.open_device).take();
        }
    }
}

/// A running repeating request.
struct Stream {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl Stream {
    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.join.join().is_err() {
            warn!("simulated sensor thread panicked");
        }
    }
}

struct SimulatedSession {
    control: Arc<Control>,
    events: HalEvents,
    stream: Option<Stream>,
    closed: bool,
}

impl SimulatedSession {
    fn ensure_open(&self) -> Result<(), CameraError> {
        if self.closed {
            Err(CameraError::access("capture session was closed"))
        } else {
            Ok(())
        }
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl CaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.control.record(SimulatedCall::SetRepeating(request.clone()));
        let faults = self.control.faults();
        if faults.fail_repeating {
            return Err(CameraError::access("repeating request rejected"));
        }
        self.stop_stream();

        let interval = faults
            .frame_interval
            .unwrap_or_else(|| frame_interval(request.ae_target_fps_range));
        let targets = request.targets.clone();
        let control = Arc::clone(&self.control);
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let join = spawn_named("sim-sensor", move || {
            let epoch = Instant::now();
            while !stop2.load(Ordering::Acquire) {
                let sequence = control.frame_sequence.fetch_add(1, Ordering::Relaxed);
                let mismatched = lock(&control.faults).mismatched_frames.contains(&sequence);
                let timestamp_ns = epoch.elapsed().as_nanos().min(i64::MAX as u128) as i64;
                for target in &targets {
                    let mut size = target.size();
                    if mismatched {
                        size.width += 16;
                    }
                    let image = yuv_frame(size, sequence, timestamp_ns);
                    match target.queue_image(image) {
                        Ok(()) => {},
                        Err(SurfaceError::Full) => trace!(sequence, "sensor stalled"),
                        Err(SurfaceError::Abandoned) => return,
                    }
                }
                thread::sleep(interval);
            }
        })?;
        self.stream = Some(Stream { stop, join });
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.control.record(SimulatedCall::StopRepeating);
        self.stop_stream();
        Ok(())
    }

    fn capture(&mut self, request: &CaptureRequest) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.control.record(SimulatedCall::Capture(request.clone()));
        let faults = self.control.faults();
        if faults.photo == PhotoBehavior::Reject {
            return Err(CameraError::access("capture request rejected"));
        }

        let targets = request.targets.clone();
        let tag = request.tag;
        let events = self.events.clone();
        spawn_named("sim-capture", move || {
            thread::sleep(faults.capture_delay);
            for target in &targets {
                let image = match faults.photo {
                    PhotoBehavior::Jpeg => match jpeg_image(target.size()) {
                        Ok(image) => image,
                        Err(err) => {
                            warn!(%err, "simulated jpeg encoding failed");
                            events.capture_failed(tag);
                            return;
                        },
                    },
                    PhotoBehavior::WrongFormat => yuv_frame(target.size(), 0, 0),
                    PhotoBehavior::CaptureError => {
                        events.capture_failed(tag);
                        return;
                    },
                    PhotoBehavior::NoImage | PhotoBehavior::Reject => return,
                };
                if let Err(err) = target.queue_image(image) {
                    warn!(%err, "simulated photo not delivered");
                }
            }
        })?;
        Ok(())
    }

    fn abort_captures(&mut self) -> Result<(), CameraError> {
        self.ensure_open()?;
        self.control.record(SimulatedCall::AbortCaptures);
        self.stop_stream();
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.control.record(SimulatedCall::CloseSession);
            self.stop_stream();
        }
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

fn frame_interval(range: Option<FramerateRange>) -> Duration {
    match range {
        Some(range) if range.max > 1000 => Duration::from_secs(1000) / range.max as u32,
        Some(range) if range.max > 0 => Duration::from_secs(1) / range.max as u32,
        _ => DEFAULT_FRAME_INTERVAL,
    }
}

/// A YUV 4:2:0 test pattern whose luma drifts with `sequence`.
fn yuv_frame(size: Size, sequence: u64, timestamp_ns: i64) -> Image {
    let (width, height) = (size.width as usize, size.height as usize);
    let shift = sequence as usize;
    let mut luma = Vec::with_capacity(width * height);
    for y in 0..height {
        luma.extend((0..width).map(|x| ((x + y + shift) & 0xff) as u8));
    }
    let chroma_len = width.div_ceil(2) * height.div_ceil(2);
    let chroma = Bytes::from(vec![128u8; chroma_len]);
    let chroma_plane = || Plane {
        data: chroma.clone(),
        row_stride: size.width.div_ceil(2),
        pixel_stride: 1,
    };
    Image {
        format: PixelFormat::Yuv420,
        width: size.width,
        height: size.height,
        planes: vec![
            Plane {
                data: Bytes::from(luma),
                row_stride: size.width,
                pixel_stride: 1,
            },
            chroma_plane(),
            chroma_plane(),
        ],
        timestamp_ns,
    }
}

fn jpeg_image(size: Size) -> Result<Image, CameraError> {
    let pixels = RgbImage::from_fn(size.width, size.height, |x, y| {
        Rgb([(x & 0xff) as u8, (y & 0xff) as u8, 0x80])
    });
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&pixels)
        .map_err(|e| CameraError::driver("encoding simulated jpeg", e))?;
    Ok(Image {
        format: PixelFormat::Jpeg,
        width: size.width,
        height: size.height,
        planes: vec![Plane {
            data: Bytes::from(encoded),
            row_stride: 0,
            pixel_stride: 0,
        }],
        timestamp_ns: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv_frames_have_three_planes() {
        let image = yuv_frame(Size::new(5, 3), 0, 0);
        assert_eq!(image.planes.len(), 3);
        assert_eq!(image.planes[0].data.len(), 15);
        assert_eq!(image.planes[1].data.len(), 6);
        assert_eq!(image.planes[1].row_stride, 3);
    }

    #[test]
    fn jpeg_images_are_real_jpegs() {
        let image = jpeg_image(Size::new(32, 24)).unwrap();
        let data = &image.planes[0].data;
        assert_eq!(&data[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn frame_interval_follows_target_rate() {
        assert_eq!(
            frame_interval(Some(FramerateRange::new(15, 30))),
            Duration::from_secs(1) / 30
        );
        assert_eq!(
            frame_interval(Some(FramerateRange::new(15000, 30000))),
            Duration::from_secs(1) / 30
        );
        assert_eq!(frame_interval(None), DEFAULT_FRAME_INTERVAL);
    }

    #[test]
    fn rejected_open_fails_synchronously() {
        let hal = SimulatedHal::new()
            .with_camera("0", default_characteristics())
            .with_faults(SimulatedFaults {
                open: OpenBehavior::Reject,
                ..Default::default()
            });
        let (tx, _rx) = std::sync::mpsc::channel();
        let events = HalEvents::new(tx);

        let err = hal.open_camera("0", events.clone()).unwrap_err();
        assert!(matches!(err, CameraError::Access(_)));
        assert!(matches!(
            hal.open_camera("7", events),
            Err(CameraError::NoCamera)
        ));
    }
}
