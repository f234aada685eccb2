// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraCharacteristics, CameraError, CaptureRequest, EngineMessage, ImageSurface,
};
use core::fmt;
use std::sync::mpsc::Sender;
use tracing::trace;

/// Entry point of a camera backend.
pub trait CameraHal: dogma::Named + Send + Sync {
    fn camera_ids(&self) -> Result<Vec<String>, CameraError>;

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError>;

    /// Starts opening the device. The outcome is reported through `events`:
    /// [`HalEvents::device_opened`] on success, or a device error.
    fn open_camera(&self, camera_id: &str, events: HalEvents) -> Result<(), CameraError>;
}

/// An open device.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Starts configuring a session over `outputs`. The outcome is reported
    /// through the device's events, carrying `context` back unchanged.
    fn create_capture_session(
        &mut self,
        outputs: Vec<ImageSurface>,
        context: SessionContext,
    ) -> Result<(), CameraError>;

    fn close(&mut self);
}

/// A configured session.
pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError>;

    fn stop_repeating(&mut self) -> Result<(), CameraError>;

    fn capture(&mut self, request: &CaptureRequest) -> Result<(), CameraError>;

    /// Fails any capture still in flight.
    fn abort_captures(&mut self) -> Result<(), CameraError>;

    fn close(&mut self);
}

/// What a session is being built for, returned with its configure outcome.
#[derive(Debug)]
pub enum SessionContext {
    Preview {
        request: CaptureRequest,
    },
    Photo {
        request: CaptureRequest,
        callback_id: u64,
    },
}

impl SessionContext {
    pub fn is_photo(&self) -> bool {
        matches!(self, Self::Photo { .. })
    }
}

pub enum HardwareEvent {
    DeviceOpened(Box<dyn CameraDevice>),
    DeviceDisconnected,
    DeviceError(i32),
    SessionConfigured {
        session: Box<dyn CaptureSession>,
        context: SessionContext,
    },
    SessionConfigureFailed {
        context: SessionContext,
    },
    CaptureFailed {
        tag: Option<u64>,
    },
}

impl fmt::Debug for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceOpened(device) => f.debug_tuple("DeviceOpened").field(&device.id()).finish(),
            Self::DeviceDisconnected => f.write_str("DeviceDisconnected"),
            Self::DeviceError(code) => f.debug_tuple("DeviceError").field(code).finish(),
            Self::SessionConfigured { context, .. } => f
                .debug_struct("SessionConfigured")
                .field("photo", &context.is_photo())
                .finish_non_exhaustive(),
            Self::SessionConfigureFailed { context } => f
                .debug_struct("SessionConfigureFailed")
                .field("photo", &context.is_photo())
                .finish(),
            Self::CaptureFailed { tag } => f.debug_struct("CaptureFailed").field("tag", tag).finish(),
        }
    }
}

/// The only route from hardware callbacks into the engine.
///
/// Each method posts one message on the engine's ingress queue. Posting after
/// the engine has shut down is a no-op.
#[derive(Clone)]
pub struct HalEvents {
    tx: Sender<EngineMessage>,
}

impl HalEvents {
    pub(crate) fn new(tx: Sender<EngineMessage>) -> Self {
        Self { tx }
    }

    fn post(&self, event: HardwareEvent) {
        trace!(?event, "hardware event");
        if self.tx.send(EngineMessage::Hardware(event)).is_err() {
            trace!("engine gone; hardware event dropped");
        }
    }

    pub fn device_opened(&self, device: Box<dyn CameraDevice>) {
        self.post(HardwareEvent::DeviceOpened(device));
    }

    pub fn device_disconnected(&self) {
        self.post(HardwareEvent::DeviceDisconnected);
    }

    pub fn device_error(&self, code: i32) {
        self.post(HardwareEvent::DeviceError(code));
    }

    pub fn session_configured(&self, session: Box<dyn CaptureSession>, context: SessionContext) {
        self.post(HardwareEvent::SessionConfigured { session, context });
    }

    pub fn session_configure_failed(&self, context: SessionContext) {
        self.post(HardwareEvent::SessionConfigureFailed { context });
    }

    pub fn capture_failed(&self, tag: Option<u64>) {
        self.post(HardwareEvent::CaptureFailed { tag });
    }
}
