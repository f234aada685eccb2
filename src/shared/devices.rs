// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraHal, CaptureFormat, HardwareLevel, LensFacing, supported_formats};
use derive_more::Display;
use tracing::warn;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CaptureApi {
    #[display("camera2-legacy")]
    Camera2Legacy,
    #[display("camera2-limited")]
    Camera2Limited,
    #[display("camera2-full")]
    Camera2Full,
    #[display("unknown")]
    Unknown,
}

/// Everything the static queries report about one camera.
#[derive(Clone, Debug)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    pub api: CaptureApi,
    pub legacy: bool,
    pub formats: Vec<CaptureFormat>,
}

pub fn number_of_cameras(hal: &dyn CameraHal) -> usize {
    match hal.camera_ids() {
        Ok(ids) => ids.len(),
        Err(err) => {
            warn!(%err, "camera enumeration failed");
            0
        },
    }
}

pub fn camera_supported_formats(hal: &dyn CameraHal, camera_id: &str) -> Option<Vec<CaptureFormat>> {
    hal.characteristics(camera_id)
        .map(|characteristics| supported_formats(&characteristics))
        .map_err(|err| warn!(camera_id, %err, "no characteristics"))
        .ok()
}

pub fn capture_api_type(hal: &dyn CameraHal, camera_id: &str) -> CaptureApi {
    match hal.characteristics(camera_id) {
        Ok(characteristics) => match characteristics.hardware_level {
            HardwareLevel::Legacy => CaptureApi::Camera2Legacy,
            HardwareLevel::Limited => CaptureApi::Camera2Limited,
            HardwareLevel::Full => CaptureApi::Camera2Full,
            HardwareLevel::Level3 | HardwareLevel::External => CaptureApi::Camera2Legacy,
        },
        Err(_) => CaptureApi::Unknown,
    }
}

pub fn is_legacy_device(hal: &dyn CameraHal, camera_id: &str) -> bool {
    hal.characteristics(camera_id)
        .is_ok_and(|characteristics| characteristics.hardware_level == HardwareLevel::Legacy)
}

pub fn camera_name(hal: &dyn CameraHal, camera_id: &str) -> Option<String> {
    let characteristics = hal.characteristics(camera_id).ok()?;
    let facing = match characteristics.lens_facing {
        LensFacing::Front => "front",
        LensFacing::Back | LensFacing::External => "back",
    };
    Some(format!("camera2 {camera_id}, facing {facing}"))
}

pub fn describe_camera(hal: &dyn CameraHal, camera_id: &str) -> Option<CameraInfo> {
    Some(CameraInfo {
        id: camera_id.into(),
        name: camera_name(hal, camera_id)?,
        api: capture_api_type(hal, camera_id),
        legacy: is_legacy_device(hal, camera_id),
        formats: camera_supported_formats(hal, camera_id).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{PixelFormat, RequestCapability, SimulatedHal, simulated};

    #[test]
    fn queries_describe_each_camera() {
        let mut front = simulated::default_characteristics();
        front.lens_facing = LensFacing::Front;
        front.hardware_level = HardwareLevel::Legacy;
        let hal = SimulatedHal::new()
            .with_camera("0", simulated::default_characteristics())
            .with_camera("1", front);

        assert_eq!(number_of_cameras(&hal), 2);
        assert_eq!(camera_name(&hal, "0").as_deref(), Some("camera2 0, facing back"));
        assert_eq!(camera_name(&hal, "1").as_deref(), Some("camera2 1, facing front"));
        assert_eq!(capture_api_type(&hal, "0"), CaptureApi::Camera2Full);
        assert_eq!(capture_api_type(&hal, "1"), CaptureApi::Camera2Legacy);
        assert!(is_legacy_device(&hal, "1"));
        assert!(!is_legacy_device(&hal, "0"));
    }

    #[test]
    fn unknown_camera_yields_nothing() {
        let hal = SimulatedHal::new().with_camera("0", simulated::default_characteristics());
        assert_eq!(capture_api_type(&hal, "9"), CaptureApi::Unknown);
        assert_eq!(camera_name(&hal, "9"), None);
        assert!(camera_supported_formats(&hal, "9").is_none());
        assert!(describe_camera(&hal, "9").is_none());
    }

    #[test]
    fn frame_rates_need_manual_sensor() {
        let mut characteristics = simulated::default_characteristics();
        let hal = SimulatedHal::new().with_camera("0", characteristics.clone());
        let formats = camera_supported_formats(&hal, "0").unwrap();
        let yuv = formats
            .iter()
            .find(|format| format.pixel_format == PixelFormat::Yuv420)
            .unwrap();
        assert_eq!(yuv.frame_rate, 30);

        characteristics
            .capabilities
            .retain(|capability| *capability != RequestCapability::ManualSensor);
        let hal = SimulatedHal::new().with_camera("0", characteristics);
        let formats = camera_supported_formats(&hal, "0").unwrap();
        assert!(formats.iter().all(|format| format.frame_rate == 0));
    }
}
