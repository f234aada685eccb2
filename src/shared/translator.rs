// This is free and unencumbered software released into the public domain.

use crate::shared::{
    AeMode, AfMode, AfTrigger, AwbMode, CameraCharacteristics, CaptureRequest, CaptureSettings,
    FillLightMode, FlashMode, FramerateRange, METERING_WEIGHT_MAX, MeteringMode,
    MeteringRectangle, PointOfInterest, PortableSettings, Rect,
};
use tracing::debug;

/// Kelvin values, increasing, and the white-balance preset each maps to.
pub struct ColorTemperatureTable(&'static [(u32, AwbMode)]);

pub static COLOR_TEMPERATURES: ColorTemperatureTable = ColorTemperatureTable(&[
    (2850, AwbMode::Incandescent),
    (2940, AwbMode::WarmFluorescent),
    (3000, AwbMode::Twilight),
    (4230, AwbMode::Fluorescent),
    (6000, AwbMode::CloudyDaylight),
    (6504, AwbMode::Daylight),
    (7000, AwbMode::Shade),
]);

impl ColorTemperatureTable {
    /// Nearest preset by absolute Kelvin distance; the lower entry wins a tie.
    pub fn closest(&self, kelvin: u32) -> Option<AwbMode> {
        let mut closest = None;
        let mut min_diff = u32::MAX;
        for &(temperature, mode) in self.0 {
            let diff = kelvin.abs_diff(temperature);
            if diff < min_diff {
                min_diff = diff;
                closest = Some(mode);
            }
        }
        closest
    }

    pub fn kelvin_of(&self, mode: AwbMode) -> Option<u32> {
        self.0
            .iter()
            .find(|(_, preset)| *preset == mode)
            .map(|(temperature, _)| *temperature)
    }

    pub fn min_kelvin(&self) -> u32 {
        self.0.first().map_or(0, |(temperature, _)| *temperature)
    }

    pub fn max_kelvin(&self) -> u32 {
        self.0.last().map_or(0, |(temperature, _)| *temperature)
    }
}

/// Maps portable settings onto the device's native request parameters.
pub struct SettingsTranslator<'a> {
    characteristics: &'a CameraCharacteristics,
}

impl<'a> SettingsTranslator<'a> {
    pub fn new(characteristics: &'a CameraCharacteristics) -> Self {
        Self { characteristics }
    }

    /// Folds an update into the current settings, producing the new ones.
    pub fn apply(&self, current: &CaptureSettings, update: &PortableSettings) -> CaptureSettings {
        let mut next = current.clone();

        if let Some(zoom) = update.zoom.filter(|zoom| *zoom > 0.0 && zoom.is_finite()) {
            let (zoom, crop) = self.crop_for_zoom(zoom);
            debug!(zoom, %crop, "zoom level");
            if zoom != current.zoom {
                next.area_of_interest = None;
            }
            next.zoom = zoom;
            next.crop_region = crop;
        }

        if update.focus_mode != MeteringMode::NotSet {
            next.focus_mode = update.focus_mode;
        }
        if update.exposure_mode != MeteringMode::NotSet {
            next.exposure_mode = update.exposure_mode;
        }
        if update.white_balance_mode != MeteringMode::NotSet {
            next.white_balance_mode = update.white_balance_mode;
        }

        if let Some(width) = update.width.filter(|width| *width > 0) {
            next.photo_width = width;
        }
        if let Some(height) = update.height.filter(|height| *height > 0) {
            next.photo_height = height;
        }

        if next.focus_mode == MeteringMode::None || next.exposure_mode == MeteringMode::None {
            next.area_of_interest = None;
        }
        if let Some(point) = update.point_of_interest {
            if self.characteristics.supports_metering_regions() {
                let area = self.area_of_interest(point, next.crop_region);
                debug!(x = point.x, y = point.y, %area, "area of interest");
                next.area_of_interest = Some(area);
            }
        }

        if let Some(ev) = update.exposure_compensation {
            next.exposure_compensation = self.compensation_steps(ev);
        }
        if let Some(iso) = update.iso.filter(|iso| *iso > 0) {
            next.iso = iso;
        }
        if next.white_balance_mode == MeteringMode::Fixed {
            if let Some(kelvin) = update.color_temperature.filter(|kelvin| *kelvin > 0) {
                next.color_temperature = Some(kelvin);
            }
        }
        if update.fill_light_mode != FillLightMode::NotSet {
            next.fill_light_mode = update.fill_light_mode;
        }
        if let Some(red_eye) = update.red_eye_reduction {
            next.red_eye_reduction = red_eye;
        }

        next
    }

    /// Clamps `zoom` to the device range and insets the sensor rectangle to match.
    pub fn crop_for_zoom(&self, zoom: f64) -> (f64, Rect) {
        let max_zoom = f64::from(self.characteristics.max_digital_zoom).max(1.0);
        let zoom = zoom.clamp(1.0, max_zoom);
        let factor = (zoom - 1.0) / (2.0 * zoom);

        let canvas = self.characteristics.active_size();
        let (width, height) = (f64::from(canvas.width), f64::from(canvas.height));
        let crop = Rect::new(
            (width * factor).round() as i32,
            (height * factor).round() as i32,
            (width * (1.0 - factor)).round() as i32,
            (height * (1.0 - factor)).round() as i32,
        );
        (zoom, crop)
    }

    /// An eighth of the visible rectangle, centered on `point`.
    pub fn area_of_interest(&self, point: PointOfInterest, crop: Rect) -> MeteringRectangle {
        let canvas = self.characteristics.active_size();
        let (canvas_width, canvas_height) = (canvas.width as i32, canvas.height as i32);
        let (visible_width, visible_height) = if crop.is_empty() {
            (canvas_width, canvas_height)
        } else {
            (crop.width(), crop.height())
        };

        let x = point.x.clamp(0.0, 1.0);
        let y = point.y.clamp(0.0, 1.0);
        let mut center_x = (x * f64::from(visible_width)).round() as i32;
        let mut center_y = (y * f64::from(visible_height)).round() as i32;
        if !crop.is_empty() {
            center_x += (canvas_width - visible_width) / 2;
            center_y += (canvas_height - visible_height) / 2;
        }

        let width = visible_width / 8;
        let height = visible_height / 8;
        MeteringRectangle {
            x: (center_x - width / 2).max(0),
            y: (center_y - height / 2).max(0),
            width,
            height,
            weight: METERING_WEIGHT_MAX,
        }
    }

    pub fn compensation_steps(&self, ev: f64) -> i32 {
        let step = f64::from(self.characteristics.ae_compensation_step);
        if step > 0.0 && ev.is_finite() {
            (ev / step).round() as i32
        } else {
            0
        }
    }

    /// Writes the focus, exposure, flash, white-balance, region, crop and
    /// sensitivity controls for `settings` into `request`.
    pub fn configure(
        &self,
        settings: &CaptureSettings,
        ae_fps_range: Option<FramerateRange>,
        request: &mut CaptureRequest,
    ) {
        match settings.focus_mode {
            MeteringMode::Continuous => {
                request.af_mode = Some(AfMode::ContinuousPicture);
            },
            MeteringMode::SingleShot => {
                request.af_mode = Some(AfMode::ContinuousPicture);
                request.af_trigger = Some(AfTrigger::Start);
            },
            MeteringMode::Fixed => {
                request.af_mode = Some(AfMode::Off);
            },
            MeteringMode::None | MeteringMode::NotSet => {},
        }

        // Flash requests below override the AE mode chosen here.
        match settings.exposure_mode {
            MeteringMode::None | MeteringMode::Fixed => {
                request.ae_mode = Some(AeMode::Off);
            },
            _ => {
                request.ae_mode = Some(AeMode::On);
                request.ae_target_fps_range = ae_fps_range;
            },
        }
        match settings.fill_light_mode {
            FillLightMode::Off => request.flash_mode = Some(FlashMode::Off),
            FillLightMode::Auto => {
                request.ae_mode = Some(if settings.red_eye_reduction {
                    AeMode::OnAutoFlashRedeye
                } else {
                    AeMode::OnAutoFlash
                });
            },
            FillLightMode::Flash => request.ae_mode = Some(AeMode::OnAlwaysFlash),
            FillLightMode::Torch => {
                request.ae_mode = Some(AeMode::On);
                request.flash_mode = Some(FlashMode::Torch);
            },
            FillLightMode::None | FillLightMode::NotSet => {},
        }
        request.ae_exposure_compensation = Some(settings.exposure_compensation);

        match settings.white_balance_mode {
            MeteringMode::Continuous => {
                request.awb_lock = Some(false);
                request.awb_mode = Some(AwbMode::Auto);
            },
            MeteringMode::None => {
                request.awb_lock = Some(false);
                request.awb_mode = Some(AwbMode::Off);
            },
            MeteringMode::Fixed => {
                request.awb_lock = Some(true);
                if let Some(preset) = settings
                    .color_temperature
                    .and_then(|kelvin| COLOR_TEMPERATURES.closest(kelvin))
                {
                    request.awb_mode = Some(preset);
                }
            },
            MeteringMode::SingleShot | MeteringMode::NotSet => {},
        }

        if let Some(area) = settings.area_of_interest {
            request.af_regions = vec![area];
            request.ae_regions = vec![area];
            request.awb_regions = vec![area];
        }
        if !settings.crop_region.is_empty() {
            request.crop_region = Some(settings.crop_region);
        }
        if settings.iso > 0 {
            request.sensor_sensitivity = Some(settings.iso.min(i32::MAX as u32) as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{HardwareLevel, LensFacing, RequestTemplate};

    fn characteristics() -> CameraCharacteristics {
        CameraCharacteristics {
            hardware_level: HardwareLevel::Full,
            lens_facing: LensFacing::Back,
            sensor_orientation: 90,
            active_array: Rect::new(0, 0, 4000, 3000),
            max_digital_zoom: 4.0,
            stream_configurations: Vec::new(),
            capabilities: Vec::new(),
            ae_target_fps_ranges: vec![FramerateRange::new(15, 30)],
            max_regions_af: 1,
            max_regions_ae: 1,
            max_regions_awb: 0,
            sensitivity_range: Some((100, 1600)),
            ae_compensation_step: 0.5,
            ae_compensation_range: (-4, 4),
            flash_available: true,
        }
    }

    #[test]
    fn color_temperature_resolves_to_nearest_preset() {
        assert_eq!(COLOR_TEMPERATURES.closest(3100), Some(AwbMode::Twilight));
        assert_eq!(COLOR_TEMPERATURES.closest(10_000), Some(AwbMode::Shade));
        assert_eq!(COLOR_TEMPERATURES.closest(0), Some(AwbMode::Incandescent));
    }

    #[test]
    fn color_temperature_tie_goes_to_lower_entry() {
        // 2895 is 45K from both 2850 and 2940.
        assert_eq!(COLOR_TEMPERATURES.closest(2895), Some(AwbMode::Incandescent));
    }

    #[test]
    fn zoom_beyond_maximum_is_clamped_before_cropping() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let (zoom, crop) = translator.crop_for_zoom(10.0);
        assert_eq!(zoom, 4.0);
        // factor = 3/8
        assert_eq!(crop, Rect::new(1500, 1125, 2500, 1875));
        assert_eq!(translator.crop_for_zoom(4.0).1, crop);
    }

    #[test]
    fn zoom_below_one_means_no_crop() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let (zoom, crop) = translator.crop_for_zoom(0.5);
        assert_eq!(zoom, 1.0);
        assert_eq!(crop, Rect::new(0, 0, 4000, 3000));
    }

    #[test]
    fn area_of_interest_is_an_eighth_of_the_visible_rect() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);

        let full = translator.area_of_interest(PointOfInterest { x: 0.5, y: 0.5 }, Rect::default());
        assert_eq!((full.x, full.y, full.width, full.height), (1750, 1313, 500, 375));
        assert_eq!(full.weight, METERING_WEIGHT_MAX);

        let corner = translator.area_of_interest(PointOfInterest { x: 0.0, y: 0.0 }, Rect::default());
        assert_eq!((corner.x, corner.y), (0, 0));

        let crop = Rect::new(1000, 750, 3000, 2250);
        let zoomed = translator.area_of_interest(PointOfInterest { x: 0.5, y: 0.5 }, crop);
        assert_eq!((zoomed.width, zoomed.height), (250, 187));
        assert_eq!((zoomed.x, zoomed.y), (2000 - 125, 1500 - 93));
    }

    #[test]
    fn zoom_change_invalidates_area_of_interest() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let with_point = translator.apply(&CaptureSettings::default(), &PortableSettings {
            point_of_interest: Some(PointOfInterest { x: 0.2, y: 0.2 }),
            ..Default::default()
        });
        assert!(with_point.area_of_interest.is_some());

        let same_zoom = translator.apply(&with_point, &PortableSettings {
            zoom: Some(1.0),
            ..Default::default()
        });
        assert!(same_zoom.area_of_interest.is_some());

        let zoomed = translator.apply(&with_point, &PortableSettings {
            zoom: Some(2.0),
            ..Default::default()
        });
        assert!(zoomed.area_of_interest.is_none());
        assert_eq!(zoomed.crop_region, Rect::new(1000, 750, 3000, 2250));
    }

    #[test]
    fn none_focus_clears_area_of_interest() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let with_point = translator.apply(&CaptureSettings::default(), &PortableSettings {
            point_of_interest: Some(PointOfInterest { x: 0.5, y: 0.5 }),
            ..Default::default()
        });
        let cleared = translator.apply(&with_point, &PortableSettings {
            focus_mode: MeteringMode::None,
            ..Default::default()
        });
        assert_eq!(cleared.area_of_interest, None);
    }

    #[test]
    fn exposure_compensation_is_quantized_to_steps() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        assert_eq!(translator.compensation_steps(1.2), 2);
        assert_eq!(translator.compensation_steps(-0.7), -1);
        assert_eq!(translator.compensation_steps(0.0), 0);
    }

    #[test]
    fn color_temperature_is_kept_only_with_fixed_white_balance() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let auto = translator.apply(&CaptureSettings::default(), &PortableSettings {
            color_temperature: Some(5000),
            ..Default::default()
        });
        assert_eq!(auto.color_temperature, None);

        let fixed = translator.apply(&CaptureSettings::default(), &PortableSettings {
            white_balance_mode: MeteringMode::Fixed,
            color_temperature: Some(6400),
            ..Default::default()
        });
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        translator.configure(&fixed, None, &mut request);
        assert_eq!(request.awb_lock, Some(true));
        assert_eq!(request.awb_mode, Some(AwbMode::Daylight));
    }

    #[test]
    fn modes_map_onto_native_controls() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let range = FramerateRange::new(15, 30);

        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        translator.configure(&CaptureSettings::default(), Some(range), &mut request);
        assert_eq!(request.af_mode, Some(AfMode::ContinuousPicture));
        assert_eq!(request.af_trigger, None);
        assert_eq!(request.ae_mode, Some(AeMode::On));
        assert_eq!(request.ae_target_fps_range, Some(range));
        assert_eq!(request.flash_mode, Some(FlashMode::Off));
        assert_eq!(request.awb_mode, Some(AwbMode::Auto));
        assert_eq!(request.awb_lock, Some(false));
        assert_eq!(request.crop_region, None);
        assert_eq!(request.sensor_sensitivity, None);

        let settings = CaptureSettings {
            focus_mode: MeteringMode::SingleShot,
            exposure_mode: MeteringMode::Fixed,
            fill_light_mode: FillLightMode::Auto,
            red_eye_reduction: true,
            white_balance_mode: MeteringMode::None,
            iso: 400,
            ..Default::default()
        };
        let mut request = CaptureRequest::new(RequestTemplate::StillCapture);
        translator.configure(&settings, Some(range), &mut request);
        assert_eq!(request.af_mode, Some(AfMode::ContinuousPicture));
        assert_eq!(request.af_trigger, Some(AfTrigger::Start));
        assert_eq!(request.ae_mode, Some(AeMode::OnAutoFlashRedeye));
        assert_eq!(request.ae_target_fps_range, None);
        assert_eq!(request.awb_mode, Some(AwbMode::Off));
        assert_eq!(request.sensor_sensitivity, Some(400));

        let torch = CaptureSettings {
            focus_mode: MeteringMode::Fixed,
            fill_light_mode: FillLightMode::Torch,
            ..Default::default()
        };
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        translator.configure(&torch, Some(range), &mut request);
        assert_eq!(request.af_mode, Some(AfMode::Off));
        assert_eq!(request.ae_mode, Some(AeMode::On));
        assert_eq!(request.flash_mode, Some(FlashMode::Torch));
    }

    #[test]
    fn none_fill_light_is_never_sent() {
        let characteristics = characteristics();
        let translator = SettingsTranslator::new(&characteristics);
        let settings = CaptureSettings {
            fill_light_mode: FillLightMode::None,
            ..Default::default()
        };
        let mut request = CaptureRequest::new(RequestTemplate::Preview);
        translator.configure(&settings, None, &mut request);
        assert_eq!(request.flash_mode, None);
        assert_eq!(request.ae_mode, Some(AeMode::On));
    }
}
