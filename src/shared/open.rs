// This is free and unencumbered software released into the public domain.

use super::{
    CameraConfig, CameraError, CameraHal, CaptureEngine, CaptureSink, LensFacing,
    drivers::simulated::{SimulatedHal, default_characteristics},
};
use alloc::sync::{Arc, Weak};

/// Resolves an input URL to a backend and a camera id.
///
/// `sim:<id>` (or an empty URL, meaning `sim:0`) selects the simulated
/// backend, which offers a back camera `0` and a front camera `1`.
pub fn open_hal(input_url: impl AsRef<str>) -> Result<(Arc<dyn CameraHal>, String), CameraError> {
    let input_url = input_url.as_ref().trim();
    let camera_id = match input_url.split_once(':') {
        None if input_url.is_empty() || input_url == "sim" => "0",
        Some(("sim", "")) => "0",
        Some(("sim", id)) => id,
        _ => return Err(CameraError::NoDriver),
    };

    let mut front = default_characteristics();
    front.lens_facing = LensFacing::Front;
    front.sensor_orientation = 270;
    front.flash_available = false;
    let hal = SimulatedHal::new()
        .with_camera("0", default_characteristics())
        .with_camera("1", front);
    Ok((Arc::new(hal), camera_id.into()))
}

/// Opens the camera named by `input_url` and allocates the configured format.
pub fn open_camera(
    input_url: impl AsRef<str>,
    config: CameraConfig,
    sink: Weak<dyn CaptureSink>,
) -> Result<CaptureEngine, CameraError> {
    let (hal, camera_id) = open_hal(input_url)?;
    let (width, height, fps) = (config.width, config.height, config.fps);
    let engine = CaptureEngine::new(hal, camera_id, sink, config)?;
    engine.try_allocate(width, height, fps)?;
    Ok(engine)
}
