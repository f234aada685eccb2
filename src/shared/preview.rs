// This is free and unencumbered software released into the public domain.

use crate::shared::{
    Acquired, CameraError, CameraState, CaptureRequest, CaptureSession, ControlMode, EdgeMode,
    Frame, Image, ImageReader, Lifecycle, NoiseReductionMode, PixelFormat, RequestTemplate,
    Resources, SessionContext, Shared, SinkRef, Size, Teardown, engine::RotationSource,
};
use core::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, error, warn};

const PREVIEW_POLL: Duration = Duration::from_millis(200);

/// The repeating preview stream: its reader, its session, and the request
/// the session is running.
#[derive(Default)]
pub(crate) struct PreviewPipeline {
    reader: Option<ImageReader>,
    session: Option<Box<dyn CaptureSession>>,
    request: Option<CaptureRequest>,
}

impl PreviewPipeline {
    /// Parameters of the running repeating request, without its targets.
    pub fn current_request(&self) -> Option<CaptureRequest> {
        self.request.clone()
    }

    pub fn session_mut(&mut self) -> Option<&mut Box<dyn CaptureSession>> {
        self.session.as_mut()
    }

    /// Closes the session but leaves the reader in place for a rebuild.
    pub fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.request = None;
    }

    /// Closes the session, aborting in-flight captures first if asked, and
    /// hands back the reader for shutdown.
    pub fn close(&mut self, abort: bool) -> Option<ImageReader> {
        if let Some(session) = self.session.as_mut() {
            if abort {
                if let Err(err) = session.abort_captures() {
                    warn!(%err, "abort captures failed");
                }
            }
        }
        self.close_session();
        self.reader.take()
    }

    fn owns(&self, request: &CaptureRequest) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|reader| request.targets_surface(reader.surface_id()))
    }
}

pub(crate) fn apply_defaults(request: &mut CaptureRequest) {
    request.control_mode = Some(ControlMode::Auto);
    request.noise_reduction_mode = Some(NoiseReductionMode::Fast);
    request.edge_mode = Some(EdgeMode::Fast);
    request.video_stabilization = Some(true);
}

/// Builds a fresh reader and repeating request from the current settings
/// and asks the device for a session. Returns the replaced reader, to be
/// shut down once the lock is released.
pub(crate) fn create_preview_objects(
    shared: &Shared,
    resources: &mut Resources,
) -> Result<Option<ImageReader>, CameraError> {
    let request_state = shared.request_state();
    let format = request_state.format.ok_or(CameraError::NotConfigured)?;
    let device = resources.device.as_mut().ok_or(CameraError::Closed)?;

    let reader = ImageReader::spawn(
        "camera-preview",
        format.size(),
        format.pixel_format,
        shared.config.preview_buffers,
        PREVIEW_POLL,
        frame_listener(
            shared.sink.clone(),
            format.size(),
            format.pixel_format,
            shared.rotation.clone(),
            shared.config.diagnostics,
        ),
    )?;

    let mut request = CaptureRequest::new(RequestTemplate::Preview);
    request.add_target(reader.surface());
    apply_defaults(&mut request);
    shared.translator().configure(
        &request_state.settings,
        request_state.ae_fps_range,
        &mut request,
    );
    debug!(%format, "creating preview session");

    device.create_capture_session(vec![reader.surface()], SessionContext::Preview { request })?;
    Ok(resources.preview.reader.replace(reader))
}

/// The device configured a preview session: start it repeating.
pub(crate) fn on_session_configured(
    shared: &Shared,
    mut session: Box<dyn CaptureSession>,
    request: CaptureRequest,
) {
    let mut lifecycle = shared.machine.lock();
    let state = lifecycle.state();
    let live = lifecycle.device.is_some()
        && matches!(state, CameraState::Configuring | CameraState::Started);
    if !live || !lifecycle.preview.owns(&request) || lifecycle.photo.is_some() {
        warn!(%state, "discarding stale preview session");
        session.close();
        return;
    }

    if let Err(err) = session.set_repeating_request(&request) {
        error!(%err, "set repeating request failed");
        session.close();
        let teardown = stop_all(shared, &mut lifecycle);
        drop(lifecycle);
        teardown.finish();
        shared.sink.error(&format!("Error starting preview: {err}"));
        return;
    }

    lifecycle.preview.close_session();
    lifecycle.preview.session = Some(session);
    lifecycle.preview.request = Some(request.without_targets());

    if state == CameraState::Configuring {
        shared
            .machine
            .transition(&mut lifecycle, CameraState::Started);
        drop(lifecycle);
        shared.sink.started();
    }
}

pub(crate) fn on_session_configure_failed(shared: &Shared, request: &CaptureRequest) {
    let mut lifecycle = shared.machine.lock();
    let state = lifecycle.state();
    if state == CameraState::Stopped || !lifecycle.preview.owns(request) {
        debug!(%state, "ignoring configure failure of a stale preview session");
        return;
    }

    let err = CameraError::configuration("preview session");
    error!(%err, "preview session configuration failed");
    let teardown = stop_all(shared, &mut lifecycle);
    drop(lifecycle);
    teardown.finish();
    shared.sink.error("Camera session configuration error");
}

/// What became of a scheduled preview restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Restart {
    Done,
    /// The device is still opening or configuring; try again later.
    Deferred,
}

/// Rebuilds the preview after a settings change.
pub(crate) fn restart(shared: &Shared) -> Restart {
    let mut lifecycle = shared.machine.lock();
    let state = lifecycle.state();
    if state.is_settling() {
        debug!(%state, "preview restart deferred until the camera settles");
        return Restart::Deferred;
    }
    if state != CameraState::Started || lifecycle.device.is_none() {
        debug!(%state, "skipping preview restart");
        return Restart::Done;
    }
    if lifecycle.photo.is_some() {
        debug!("photo in flight; preview restart left to photo completion");
        return Restart::Done;
    }

    debug!("restarting preview");
    lifecycle.preview.close_session();
    match create_preview_objects(shared, &mut lifecycle) {
        Ok(replaced) => {
            drop(lifecycle);
            replaced.into_iter().for_each(ImageReader::shutdown);
        },
        Err(err) => {
            error!(%err, "preview restart failed");
            let teardown = stop_all(shared, &mut lifecycle);
            drop(lifecycle);
            teardown.finish();
            shared.sink.error("Error restarting preview");
        },
    }
    Restart::Done
}

/// Releases every resource and moves to stopped. The returned teardown must
/// be finished once the lock is dropped.
pub(crate) fn stop_all(shared: &Shared, lifecycle: &mut Lifecycle<Resources>) -> Teardown {
    let teardown = lifecycle.release_all(false);
    shared
        .machine
        .transition(lifecycle, CameraState::Stopped);
    teardown
}

/// Validates and forwards frames; runs on the preview reader's worker.
fn frame_listener(
    sink: SinkRef,
    expected_size: Size,
    expected_format: PixelFormat,
    rotation: RotationSource,
    diagnostics: bool,
) -> impl FnMut(Acquired) -> ControlFlow<()> + Send + 'static {
    move |acquired| {
        if let Acquired::Image(image) = acquired {
            match validate_frame(&image, expected_size, expected_format) {
                Ok(()) => {
                    if diagnostics {
                        debug!(timestamp_ns = image.timestamp_ns, size = %image.size(), "frame");
                    }
                    sink.frame(&Frame::from_image(image, rotation.degrees()));
                },
                Err(err) => {
                    warn!(%err, "dropping frame");
                    sink.error(&err.to_string());
                },
            }
        }
        ControlFlow::Continue(())
    }
}

pub(crate) fn validate_frame(
    image: &Image,
    expected_size: Size,
    expected_format: PixelFormat,
) -> Result<(), CameraError> {
    if image.format != expected_format || image.planes.len() != expected_format.plane_count() {
        return Err(CameraError::protocol(format!(
            "Unexpected image format: {} or #planes: {}",
            image.format,
            image.planes.len()
        )));
    }
    if image.size() != expected_size {
        return Err(CameraError::protocol(format!(
            "ImageReader size ({expected_size}) did not match Image size ({})",
            image.size()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{ErrorCategory, Plane};
    use bytes::Bytes;

    fn yuv(width: u32, height: u32, planes: usize) -> Image {
        Image {
            format: PixelFormat::Yuv420,
            width,
            height,
            planes: (0..planes)
                .map(|_| Plane {
                    data: Bytes::from_static(&[0; 4]),
                    row_stride: width,
                    pixel_stride: 1,
                })
                .collect(),
            timestamp_ns: 1,
        }
    }

    #[test]
    fn matching_frame_passes() {
        assert!(validate_frame(&yuv(640, 480, 3), Size::new(640, 480), PixelFormat::Yuv420).is_ok());
    }

    #[test]
    fn size_mismatch_is_a_protocol_error() {
        let err = validate_frame(&yuv(656, 480, 3), Size::new(640, 480), PixelFormat::Yuv420)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(
            err.to_string(),
            "ImageReader size (640x480) did not match Image size (656x480)"
        );
    }

    #[test]
    fn plane_count_mismatch_is_a_protocol_error() {
        let err = validate_frame(&yuv(640, 480, 1), Size::new(640, 480), PixelFormat::Yuv420)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn defaults_request_auto_control() {
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        apply_defaults(&mut request);
        assert_eq!(request.control_mode, Some(ControlMode::Auto));
        assert_eq!(request.noise_reduction_mode, Some(NoiseReductionMode::Fast));
        assert_eq!(request.edge_mode, Some(EdgeMode::Fast));
        assert_eq!(request.video_stabilization, Some(true));
    }
}
