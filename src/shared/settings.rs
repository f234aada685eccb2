// This is free and unencumbered software released into the public domain.

use crate::shared::{MeteringRectangle, Rect};
use derive_more::Display;

/// Portable focus/exposure/white-balance mode.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum MeteringMode {
    #[default]
    #[display("not-set")]
    NotSet,
    #[display("none")]
    None,
    #[display("continuous")]
    Continuous,
    /// Focus only.
    #[display("single-shot")]
    SingleShot,
    #[display("fixed")]
    Fixed,
}

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum FillLightMode {
    #[default]
    #[display("not-set")]
    NotSet,
    /// The device has no flash. Reported, never requested.
    #[display("none")]
    None,
    #[display("off")]
    Off,
    #[display("auto")]
    Auto,
    #[display("flash")]
    Flash,
    #[display("torch")]
    Torch,
}

/// A point in normalized `[0, 1]²` preview coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointOfInterest {
    pub x: f64,
    pub y: f64,
}

/// A partial settings update from the caller. Unset fields keep their
/// current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortableSettings {
    pub zoom: Option<f64>,
    pub focus_mode: MeteringMode,
    pub exposure_mode: MeteringMode,
    pub white_balance_mode: MeteringMode,
    pub fill_light_mode: FillLightMode,
    /// Requested photo width; 0 or unset keeps the current one.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub point_of_interest: Option<PointOfInterest>,
    /// In EV; quantized to the device's compensation step.
    pub exposure_compensation: Option<f64>,
    pub iso: Option<u32>,
    /// In Kelvin; only honoured with a fixed white balance.
    pub color_temperature: Option<u32>,
    pub red_eye_reduction: Option<bool>,
}

/// Settings in force for the next session build.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureSettings {
    pub focus_mode: MeteringMode,
    pub exposure_mode: MeteringMode,
    pub white_balance_mode: MeteringMode,
    pub fill_light_mode: FillLightMode,
    pub red_eye_reduction: bool,
    /// In device compensation steps.
    pub exposure_compensation: i32,
    /// 0 leaves sensitivity to the device.
    pub iso: u32,
    pub color_temperature: Option<u32>,
    pub zoom: f64,
    /// Empty when zoom has never been applied.
    pub crop_region: Rect,
    pub area_of_interest: Option<MeteringRectangle>,
    pub photo_width: u32,
    pub photo_height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            focus_mode: MeteringMode::Continuous,
            exposure_mode: MeteringMode::Continuous,
            white_balance_mode: MeteringMode::Continuous,
            fill_light_mode: FillLightMode::Off,
            red_eye_reduction: false,
            exposure_compensation: 0,
            iso: 0,
            color_temperature: None,
            zoom: 1.0,
            crop_region: Rect::default(),
            area_of_interest: None,
            photo_width: 0,
            photo_height: 0,
        }
    }
}

impl CaptureSettings {
    /// Drops the zoom crop, as a completed stop does.
    pub fn without_crop(&self) -> Self {
        Self {
            zoom: 1.0,
            crop_region: Rect::default(),
            ..self.clone()
        }
    }
}
