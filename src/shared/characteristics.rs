// This is free and unencumbered software released into the public domain.

use crate::shared::{FramerateRange, PixelFormat, Rect, Size};
use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum HardwareLevel {
    #[display("LEGACY")]
    Legacy,
    #[display("LIMITED")]
    Limited,
    #[display("FULL")]
    Full,
    #[display("LEVEL_3")]
    Level3,
    #[display("EXTERNAL")]
    External,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum LensFacing {
    #[display("front")]
    Front,
    #[display("back")]
    Back,
    #[display("external")]
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestCapability {
    BackwardCompatible,
    ManualSensor,
    ManualPostProcessing,
    Raw,
    BurstCapture,
}

/// One entry of the device's output stream configuration map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfiguration {
    pub format: PixelFormat,
    pub size: Size,
    pub min_frame_duration_ns: u64,
}

/// Static capability descriptor of one camera, as reported by the HAL.
#[derive(Clone, Debug)]
pub struct CameraCharacteristics {
    pub hardware_level: HardwareLevel,
    pub lens_facing: LensFacing,
    /// Clockwise degrees the sensor image must be rotated to be upright.
    pub sensor_orientation: u32,
    pub active_array: Rect,
    pub max_digital_zoom: f32,
    pub stream_configurations: Vec<StreamConfiguration>,
    pub capabilities: Vec<RequestCapability>,
    /// Target FPS ranges in the unit the device reports them in.
    pub ae_target_fps_ranges: Vec<FramerateRange>,
    pub max_regions_af: u32,
    pub max_regions_ae: u32,
    pub max_regions_awb: u32,
    pub sensitivity_range: Option<(i32, i32)>,
    pub ae_compensation_step: f32,
    pub ae_compensation_range: (i32, i32),
    pub flash_available: bool,
}

impl CameraCharacteristics {
    /// Distinct output formats, in configuration order.
    pub fn output_formats(&self) -> Vec<PixelFormat> {
        let mut formats = Vec::new();
        for config in &self.stream_configurations {
            if !formats.contains(&config.format) {
                formats.push(config.format);
            }
        }
        formats
    }

    /// Output sizes for `format`, in device-reported order.
    pub fn output_sizes(&self, format: PixelFormat) -> Vec<Size> {
        self.stream_configurations
            .iter()
            .filter(|config| config.format == format)
            .map(|config| config.size)
            .collect()
    }

    pub fn min_frame_duration(&self, format: PixelFormat, size: Size) -> Option<u64> {
        self.stream_configurations
            .iter()
            .find(|config| config.format == format && config.size == size)
            .map(|config| config.min_frame_duration_ns)
    }

    pub fn has_capability(&self, capability: RequestCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether any of focus, exposure, or white balance accepts metering regions.
    pub fn supports_metering_regions(&self) -> bool {
        self.max_regions_af > 0 || self.max_regions_ae > 0 || self.max_regions_awb > 0
    }

    pub fn active_size(&self) -> Size {
        Size::new(
            self.active_array.width().max(0) as u32,
            self.active_array.height().max(0) as u32,
        )
    }
}
