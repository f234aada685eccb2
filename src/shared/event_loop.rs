// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraDevice, CameraError, CameraState, EngineMessage, HardwareEvent, SessionContext, Shared,
    photo,
    preview::{self, Restart},
};
use alloc::sync::Arc;
use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

/// Lower bound on how often a deferred restart rechecks the state.
const SETTLE_RETRY: Duration = Duration::from_millis(10);

/// The hardware-event context: the single consumer of the ingress queue.
///
/// Every device and session callback, every debounced preview restart, and
/// every photo completion is handled here, one at a time.
pub(crate) struct EventLoop {
    shared: Arc<Shared>,
    rx: Receiver<EngineMessage>,
    restart_due: Option<Instant>,
}

impl EventLoop {
    pub fn spawn(
        shared: Arc<Shared>,
        rx: Receiver<EngineMessage>,
    ) -> Result<JoinHandle<()>, CameraError> {
        let event_loop = Self {
            shared,
            rx,
            restart_due: None,
        };
        std::thread::Builder::new()
            .name("camera-events".into())
            .spawn(move || event_loop.run())
            .map_err(|e| CameraError::driver("spawning camera event thread", e))
    }

    fn run(mut self) {
        loop {
            let message = match self.restart_due {
                Some(due) => {
                    match self.rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => {
                            self.restart_due = match preview::restart(&self.shared) {
                                Restart::Done => None,
                                Restart::Deferred => Some(
                                    Instant::now()
                                        + self.shared.config.restart_debounce.max(SETTLE_RETRY),
                                ),
                            };
                            continue;
                        },
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                },
                None => match self.rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            match message {
                EngineMessage::Hardware(event) => self.on_hardware_event(event),
                EngineMessage::ScheduleRestart => {
                    // Replaces any restart that has not run yet.
                    self.restart_due = Some(Instant::now() + self.shared.config.restart_debounce);
                },
                EngineMessage::PhotoFinished { callback_id } => {
                    photo::on_photo_finished(&self.shared, callback_id);
                },
                EngineMessage::Shutdown => break,
            }
        }
        debug!(camera_id = %self.shared.camera_id, "camera event loop exited");
    }

    fn on_hardware_event(&self, event: HardwareEvent) {
        let shared = &self.shared;
        match event {
            HardwareEvent::DeviceOpened(device) => self.on_device_opened(device),
            HardwareEvent::DeviceDisconnected => self.on_device_lost(None),
            HardwareEvent::DeviceError(code) => self.on_device_lost(Some(code)),
            HardwareEvent::SessionConfigured { session, context } => match context {
                SessionContext::Preview { request } => {
                    preview::on_session_configured(shared, session, request)
                },
                SessionContext::Photo {
                    request,
                    callback_id,
                } => photo::on_session_configured(shared, session, request, callback_id),
            },
            HardwareEvent::SessionConfigureFailed { context } => match context {
                SessionContext::Preview { request } => {
                    preview::on_session_configure_failed(shared, &request)
                },
                SessionContext::Photo { callback_id, .. } => {
                    photo::on_session_configure_failed(shared, callback_id)
                },
            },
            HardwareEvent::CaptureFailed { tag } => photo::on_capture_failed(shared, tag),
        }
    }

    fn on_device_opened(&self, mut device: Box<dyn CameraDevice>) {
        let shared = &self.shared;
        let mut lifecycle = shared.machine.lock();
        if lifecycle.state() != CameraState::Opening {
            warn!(state = %lifecycle.state(), "device opened after open was abandoned");
            device.close();
            return;
        }
        debug!(camera_id = device.id(), "camera device opened");

        // A start issued while already started replaces the previous device.
        let stale = lifecycle.release_all(false);
        lifecycle.device = Some(device);
        shared
            .machine
            .transition(&mut lifecycle, CameraState::Configuring);

        match preview::create_preview_objects(shared, &mut lifecycle) {
            Ok(replaced) => {
                drop(lifecycle);
                stale.finish();
                replaced.into_iter().for_each(|reader| reader.shutdown());
            },
            Err(err) => {
                error!(%err, "creating preview session failed");
                let teardown = lifecycle.release_all(false);
                shared
                    .machine
                    .transition(&mut lifecycle, CameraState::Stopped);
                drop(lifecycle);
                stale.finish();
                teardown.finish();
                shared.sink.error("Error configuring camera");
            },
        }
    }

    fn on_device_lost(&self, code: Option<i32>) {
        let shared = &self.shared;
        let mut lifecycle = shared.machine.lock();
        let state = lifecycle.state();
        if state == CameraState::Stopped {
            debug!(?code, "device event after stop ignored");
            return;
        }
        let teardown = lifecycle.release_all(false);
        shared
            .machine
            .transition(&mut lifecycle, CameraState::Stopped);
        drop(lifecycle);
        teardown.finish();

        match code {
            Some(code) => {
                error!(code, %state, "camera device error");
                shared.sink.error(&format!("Camera device error {code}"));
            },
            None => warn!(%state, err = %CameraError::Disconnected, "camera device lost"),
        }
    }
}
