// This is free and unencumbered software released into the public domain.

use crate::shared::{
    AeMode, AfMode, AwbMode, COLOR_TEMPERATURES, CameraCharacteristics, CaptureRequest,
    FillLightMode, FlashMode, MeteringMode, PixelFormat, Size,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RangeCapability {
    pub min: f64,
    pub max: f64,
    pub current: f64,
    pub step: f64,
}

impl RangeCapability {
    pub const fn new(min: f64, max: f64, current: f64, step: f64) -> Self {
        Self {
            min,
            max,
            current,
            step,
        }
    }
}

/// Snapshot of what the camera can do and what it is currently doing.
#[derive(Clone, Debug, PartialEq)]
pub struct PhotoCapabilities {
    pub iso: RangeCapability,
    pub width: RangeCapability,
    pub height: RangeCapability,
    pub zoom: RangeCapability,
    pub exposure_compensation: RangeCapability,
    pub color_temperature: RangeCapability,
    pub focus_mode: MeteringMode,
    pub exposure_mode: MeteringMode,
    pub white_balance_mode: MeteringMode,
    pub fill_light_mode: FillLightMode,
    pub red_eye_reduction: bool,
}

impl PhotoCapabilities {
    /// Derives capabilities from the device descriptor and the request the
    /// preview is (or would be) running with.
    ///
    /// `photo_size` is the photo size currently in force.
    pub fn derive(
        characteristics: &CameraCharacteristics,
        request: &CaptureRequest,
        photo_size: Size,
    ) -> Self {
        let (min_iso, max_iso) = characteristics.sensitivity_range.unwrap_or((0, 0));
        let iso = RangeCapability::new(
            f64::from(min_iso),
            f64::from(max_iso),
            f64::from(request.sensor_sensitivity.unwrap_or(0)),
            1.0,
        );

        let sizes = characteristics.output_sizes(PixelFormat::Jpeg);
        let bounds = |axis: fn(&Size) -> u32| {
            let min = sizes.iter().map(axis).min().unwrap_or(0);
            let max = sizes.iter().map(axis).max().unwrap_or(0);
            (f64::from(min), f64::from(max))
        };
        let (min_width, max_width) = bounds(|size| size.width);
        let (min_height, max_height) = bounds(|size| size.height);
        let width = RangeCapability::new(min_width, max_width, f64::from(photo_size.width), 1.0);
        let height =
            RangeCapability::new(min_height, max_height, f64::from(photo_size.height), 1.0);

        let active_width = f64::from(characteristics.active_array.width());
        let current_zoom = match request.crop_region {
            Some(crop) if crop.width() > 0 => active_width / f64::from(crop.width()),
            _ => 1.0,
        };
        let zoom = RangeCapability::new(
            1.0,
            f64::from(characteristics.max_digital_zoom).max(1.0),
            current_zoom,
            0.1,
        );

        let focus_mode = match request.af_mode {
            Some(AfMode::ContinuousVideo | AfMode::ContinuousPicture) => MeteringMode::Continuous,
            Some(AfMode::Auto | AfMode::Macro) => MeteringMode::SingleShot,
            Some(AfMode::Off) => MeteringMode::Fixed,
            Some(AfMode::Edof) | None => MeteringMode::None,
        };

        let mut exposure_mode = MeteringMode::Continuous;
        if request.ae_mode == Some(AeMode::Off) {
            exposure_mode = MeteringMode::None;
        }
        if request.ae_lock == Some(true) {
            exposure_mode = MeteringMode::Fixed;
        }

        let step = f64::from(characteristics.ae_compensation_step);
        let (min_steps, max_steps) = characteristics.ae_compensation_range;
        let exposure_compensation = RangeCapability::new(
            f64::from(min_steps) * step,
            f64::from(max_steps) * step,
            f64::from(request.ae_exposure_compensation.unwrap_or(0)) * step,
            step,
        );

        let white_balance_mode = match request.awb_mode {
            Some(AwbMode::Off) => MeteringMode::None,
            Some(AwbMode::Auto) | None => MeteringMode::Continuous,
            Some(_) => MeteringMode::Fixed,
        };
        let current_kelvin = request
            .awb_mode
            .and_then(|mode| COLOR_TEMPERATURES.kelvin_of(mode))
            .unwrap_or(0);
        let color_temperature = RangeCapability::new(
            f64::from(COLOR_TEMPERATURES.min_kelvin()),
            f64::from(COLOR_TEMPERATURES.max_kelvin()),
            f64::from(current_kelvin),
            1.0,
        );

        let (fill_light_mode, red_eye_reduction) = if !characteristics.flash_available {
            (FillLightMode::None, false)
        } else {
            match request.ae_mode {
                Some(AeMode::OnAutoFlashRedeye) => (FillLightMode::Auto, true),
                Some(AeMode::OnAutoFlash) => (FillLightMode::Auto, false),
                Some(AeMode::OnAlwaysFlash) => (FillLightMode::Flash, false),
                Some(AeMode::On | AeMode::Off) => match request.flash_mode {
                    Some(FlashMode::Off) => (FillLightMode::Off, false),
                    Some(FlashMode::Single) => (FillLightMode::Flash, false),
                    Some(FlashMode::Torch) => (FillLightMode::Torch, false),
                    None => (FillLightMode::NotSet, false),
                },
                None => (FillLightMode::None, false),
            }
        };

        Self {
            iso,
            width,
            height,
            zoom,
            exposure_compensation,
            color_temperature,
            focus_mode,
            exposure_mode,
            white_balance_mode,
            fill_light_mode,
            red_eye_reduction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{
        FramerateRange, HardwareLevel, LensFacing, Rect, RequestTemplate, StreamConfiguration,
    };

    fn characteristics(flash_available: bool) -> CameraCharacteristics {
        let jpeg = |width, height| StreamConfiguration {
            format: PixelFormat::Jpeg,
            size: Size::new(width, height),
            min_frame_duration_ns: 33_333_333,
        };
        CameraCharacteristics {
            hardware_level: HardwareLevel::Limited,
            lens_facing: LensFacing::Front,
            sensor_orientation: 270,
            active_array: Rect::new(0, 0, 2000, 1500),
            max_digital_zoom: 3.0,
            stream_configurations: vec![jpeg(1600, 1200), jpeg(320, 240), jpeg(1920, 1080)],
            capabilities: Vec::new(),
            ae_target_fps_ranges: vec![FramerateRange::new(30, 30)],
            max_regions_af: 0,
            max_regions_ae: 0,
            max_regions_awb: 0,
            sensitivity_range: None,
            ae_compensation_step: 0.5,
            ae_compensation_range: (-6, 6),
            flash_available,
        }
    }

    #[test]
    fn ranges_follow_device_descriptor() {
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        request.crop_region = Some(Rect::new(500, 375, 1500, 1125));
        request.ae_exposure_compensation = Some(-2);
        request.awb_mode = Some(AwbMode::CloudyDaylight);

        let caps = PhotoCapabilities::derive(&characteristics(true), &request, Size::new(640, 480));
        assert_eq!(caps.iso, RangeCapability::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(caps.width, RangeCapability::new(320.0, 1920.0, 640.0, 1.0));
        assert_eq!(caps.height, RangeCapability::new(240.0, 1200.0, 480.0, 1.0));
        assert_eq!(caps.zoom, RangeCapability::new(1.0, 3.0, 2.0, 0.1));
        assert_eq!(caps.exposure_compensation, RangeCapability::new(-3.0, 3.0, -1.0, 0.5));
        assert_eq!(caps.white_balance_mode, MeteringMode::Fixed);
        assert_eq!(caps.color_temperature, RangeCapability::new(2850.0, 7000.0, 6000.0, 1.0));
    }

    #[test]
    fn modes_are_classified_from_request() {
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        request.af_mode = Some(AfMode::Macro);
        request.ae_mode = Some(AeMode::Off);
        request.awb_mode = Some(AwbMode::Off);
        request.flash_mode = Some(FlashMode::Torch);

        let caps = PhotoCapabilities::derive(&characteristics(true), &request, Size::default());
        assert_eq!(caps.focus_mode, MeteringMode::SingleShot);
        assert_eq!(caps.exposure_mode, MeteringMode::None);
        assert_eq!(caps.white_balance_mode, MeteringMode::None);
        assert_eq!(caps.fill_light_mode, FillLightMode::Torch);

        request.ae_lock = Some(true);
        request.ae_mode = Some(AeMode::OnAutoFlashRedeye);
        let caps = PhotoCapabilities::derive(&characteristics(true), &request, Size::default());
        assert_eq!(caps.exposure_mode, MeteringMode::Fixed);
        assert_eq!(caps.fill_light_mode, FillLightMode::Auto);
        assert!(caps.red_eye_reduction);
    }

    #[test]
    fn no_flash_unit_reports_none() {
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        request.ae_mode = Some(AeMode::OnAlwaysFlash);
        let caps = PhotoCapabilities::derive(&characteristics(false), &request, Size::default());
        assert_eq!(caps.fill_light_mode, FillLightMode::None);
    }
}
