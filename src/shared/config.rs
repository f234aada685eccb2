// This is free and unencumbered software released into the public domain.

use crate::shared::CameraError;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Input URL of the camera, e.g. `sim:0`.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Images the preview reader may hold before the hardware stalls.
    pub preview_buffers: usize,
    /// How long a photo reader waits for its image before failing the photo.
    pub photo_timeout: Duration,
    /// Quiet period before a settings change rebuilds the preview session.
    pub restart_debounce: Duration,
    pub diagnostics: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: 640,
            height: 480,
            fps: 30,
            preview_buffers: 2,
            photo_timeout: Duration::from_secs(5),
            restart_debounce: Duration::from_millis(50),
            diagnostics: false,
        }
    }
}

impl CameraConfig {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_preview_buffers(mut self, n: usize) -> Self {
        self.preview_buffers = n.max(1);
        self
    }

    pub fn with_photo_timeout(mut self, timeout: Duration) -> Self {
        self.photo_timeout = timeout;
        self
    }

    pub fn with_restart_debounce(mut self, delay: Duration) -> Self {
        self.restart_debounce = delay;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.preview_buffers == 0 {
            return Err(CameraError::invalid_config("preview_buffers must be at least 1"));
        }
        if self.photo_timeout.is_zero() {
            return Err(CameraError::invalid_config("photo_timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CameraConfig::default().validate().is_ok());
        assert_eq!(CameraConfig::default().with_preview_buffers(0).preview_buffers, 1);
    }

    #[test]
    fn zero_buffers_or_timeout_are_rejected() {
        let config = CameraConfig {
            preview_buffers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CameraError::InvalidConfig(_))));

        let config = CameraConfig::default().with_photo_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(CameraError::InvalidConfig(_))));
    }
}
