// This is free and unencumbered software released into the public domain.

use crate::shared::{FramerateRange, ImageSurface, MeteringRectangle, Rect};
use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum RequestTemplate {
    #[display("PREVIEW")]
    Preview,
    #[display("STILL_CAPTURE")]
    StillCapture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMode {
    Off,
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseReductionMode {
    Off,
    Fast,
    HighQuality,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeMode {
    Off,
    Fast,
    HighQuality,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeMode {
    Off,
    On,
    OnAutoFlash,
    OnAlwaysFlash,
    OnAutoFlashRedeye,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashMode {
    Off,
    Single,
    Torch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AwbMode {
    Off,
    Auto,
    Incandescent,
    Fluorescent,
    WarmFluorescent,
    Daylight,
    CloudyDaylight,
    Twilight,
    Shade,
}

/// Device-native capture parameters.
///
/// `None` leaves a control at the template's default. A request is handed to
/// the HAL by value or shared reference and is never altered afterwards; a
/// settings change builds a new one.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    /// Correlates capture failures with the photo that issued them.
    pub tag: Option<u64>,
    pub targets: Vec<ImageSurface>,
    pub control_mode: Option<ControlMode>,
    pub noise_reduction_mode: Option<NoiseReductionMode>,
    pub edge_mode: Option<EdgeMode>,
    pub video_stabilization: Option<bool>,
    pub af_mode: Option<AfMode>,
    pub af_trigger: Option<AfTrigger>,
    pub ae_mode: Option<AeMode>,
    pub ae_lock: Option<bool>,
    pub ae_target_fps_range: Option<FramerateRange>,
    pub ae_exposure_compensation: Option<i32>,
    pub flash_mode: Option<FlashMode>,
    pub awb_mode: Option<AwbMode>,
    pub awb_lock: Option<bool>,
    pub af_regions: Vec<MeteringRectangle>,
    pub ae_regions: Vec<MeteringRectangle>,
    pub awb_regions: Vec<MeteringRectangle>,
    pub crop_region: Option<Rect>,
    pub sensor_sensitivity: Option<i32>,
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            template,
            tag: None,
            targets: Vec::new(),
            control_mode: None,
            noise_reduction_mode: None,
            edge_mode: None,
            video_stabilization: None,
            af_mode: None,
            af_trigger: None,
            ae_mode: None,
            ae_lock: None,
            ae_target_fps_range: None,
            ae_exposure_compensation: None,
            flash_mode: None,
            awb_mode: None,
            awb_lock: None,
            af_regions: Vec::new(),
            ae_regions: Vec::new(),
            awb_regions: Vec::new(),
            crop_region: None,
            sensor_sensitivity: None,
            jpeg_orientation: None,
        }
    }

    pub fn add_target(&mut self, surface: ImageSurface) {
        self.targets.push(surface);
    }

    pub fn targets_surface(&self, surface_id: u64) -> bool {
        self.targets.iter().any(|target| target.id() == surface_id)
    }

    /// The parameters alone, detached from any output surface.
    pub fn without_targets(&self) -> Self {
        Self {
            targets: Vec::new(),
            ..self.clone()
        }
    }
}
