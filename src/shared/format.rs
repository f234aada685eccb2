// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraCharacteristics, CameraError, PixelFormat, RequestCapability, Size,
};
use derive_more::Display;
use tracing::debug;

/// Framerates are compared in frames per second times this factor.
pub const FPS_UNIT: i32 = 1000;

/// Upper bounds above this are taken to be already scaled by [`FPS_UNIT`].
const SCALED_FPS_THRESHOLD: i32 = 1000;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("[{min} - {max}]")]
pub struct FramerateRange {
    pub min: i32,
    pub max: i32,
}

impl FramerateRange {
    /// Builds a range, swapping the bounds if given out of order.
    pub const fn new(min: i32, max: i32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    fn distance_to(&self, target: i32) -> i64 {
        if target <= 0 {
            return 0;
        }
        let target = i64::from(target);
        (i64::from(self.min) - target).abs() + (i64::from(self.max) - target).abs()
    }
}

/// Device framerate ranges brought into the common fps×1000 unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedFramerates {
    pub ranges: Vec<FramerateRange>,
    /// Multiplier applied to the device values; 1 if they were already scaled.
    pub unit_factor: i32,
}

impl NormalizedFramerates {
    /// The unit is inferred from the first range alone.
    pub fn from_device(ranges: &[FramerateRange]) -> Option<Self> {
        let first = ranges.first()?;
        let unit_factor = if first.max > SCALED_FPS_THRESHOLD {
            1
        } else {
            FPS_UNIT
        };
        let ranges = ranges
            .iter()
            .map(|range| {
                FramerateRange::new(
                    range.min.saturating_mul(unit_factor),
                    range.max.saturating_mul(unit_factor),
                )
            })
            .collect();
        Some(Self {
            ranges,
            unit_factor,
        })
    }

    pub fn to_device(&self, range: FramerateRange) -> FramerateRange {
        FramerateRange::new(range.min / self.unit_factor, range.max / self.unit_factor)
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[display("{width}x{height}@{frame_rate} {pixel_format}")]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    /// Frames per second; 0 means unspecified.
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
}

impl CaptureFormat {
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Picks the size with the smallest summed per-axis distance to the target.
///
/// A zero `width` or `height` matches any value on that axis. Ties go to the
/// earliest candidate.
pub fn closest_size(sizes: &[Size], width: u32, height: u32) -> Option<Size> {
    let mut closest = None;
    let mut min_diff = u64::MAX;
    for size in sizes {
        let dx = if width > 0 { size.width.abs_diff(width) } else { 0 };
        let dy = if height > 0 { size.height.abs_diff(height) } else { 0 };
        let diff = u64::from(dx) + u64::from(dy);
        if diff < min_diff {
            min_diff = diff;
            closest = Some(*size);
        }
    }
    closest
}

/// Picks the normalized range whose bounds are nearest the target (fps×1000).
///
/// A target of 0 matches any range, so the first one is returned.
pub fn closest_framerate_range(ranges: &[FramerateRange], target: i32) -> Option<FramerateRange> {
    let mut closest = None;
    let mut min_diff = i64::MAX;
    for range in ranges {
        let diff = range.distance_to(target);
        if diff < min_diff {
            min_diff = diff;
            closest = Some(*range);
        }
    }
    closest
}

/// Result of format negotiation for one `allocate` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Negotiated {
    pub format: CaptureFormat,
    /// AE target range, in device units.
    pub ae_fps_range: FramerateRange,
}

pub fn negotiate(
    characteristics: &CameraCharacteristics,
    width: u32,
    height: u32,
    frame_rate: u32,
) -> Result<Negotiated, CameraError> {
    if !characteristics.has_capability(RequestCapability::BackwardCompatible) {
        return Err(CameraError::unsupported("camera cannot stream color frames"));
    }
    let sizes = characteristics.output_sizes(PixelFormat::Yuv420);
    let size = closest_size(&sizes, width, height).ok_or(CameraError::NoSupportedSize)?;

    let normalized = NormalizedFramerates::from_device(&characteristics.ae_target_fps_ranges)
        .ok_or(CameraError::NoSupportedFramerate)?;
    let target = i32::try_from(frame_rate)
        .unwrap_or(i32::MAX)
        .saturating_mul(FPS_UNIT);
    let range = closest_framerate_range(&normalized.ranges, target)
        .ok_or(CameraError::NoSupportedFramerate)?;
    let ae_fps_range = normalized.to_device(range);

    debug!(%size, %ae_fps_range, "allocate: matched");
    Ok(Negotiated {
        format: CaptureFormat {
            width: size.width,
            height: size.height,
            frame_rate,
            pixel_format: PixelFormat::Yuv420,
        },
        ae_fps_range,
    })
}

/// Every (size, format, framerate) the device can stream.
///
/// Frame rates are only known on devices with the manual-sensor capability;
/// elsewhere they are reported as 0.
pub fn supported_formats(characteristics: &CameraCharacteristics) -> Vec<CaptureFormat> {
    let manual_sensor = characteristics.has_capability(RequestCapability::ManualSensor);
    let mut formats = Vec::new();
    for pixel_format in characteristics.output_formats() {
        for size in characteristics.output_sizes(pixel_format) {
            let frame_rate = if manual_sensor {
                match characteristics.min_frame_duration(pixel_format, size) {
                    Some(duration) if duration > 0 => {
                        (1_000_000_000 / duration).min(u64::from(u32::MAX)) as u32
                    },
                    _ => 0,
                }
            } else {
                0
            };
            formats.push(CaptureFormat {
                width: size.width,
                height: size.height,
                frame_rate,
                pixel_format,
            });
        }
    }
    formats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_size_honours_wildcard_axis() {
        let sizes = [Size::new(640, 480), Size::new(1280, 720)];
        assert_eq!(closest_size(&sizes, 0, 720), Some(Size::new(1280, 720)));
        assert_eq!(closest_size(&sizes, 700, 0), Some(Size::new(640, 480)));
    }

    #[test]
    fn closest_size_ties_go_to_first_candidate() {
        let sizes = [Size::new(1280, 720), Size::new(640, 480)];
        assert_eq!(closest_size(&sizes, 0, 0), Some(Size::new(1280, 720)));

        let sizes = [Size::new(600, 400), Size::new(700, 400)];
        assert_eq!(closest_size(&sizes, 650, 400), Some(Size::new(600, 400)));
    }

    #[test]
    fn closest_size_of_nothing_is_none() {
        assert_eq!(closest_size(&[], 640, 480), None);
    }

    #[test]
    fn framerate_units_normalize_identically() {
        let plain = NormalizedFramerates::from_device(&[
            FramerateRange::new(15, 30),
            FramerateRange::new(30, 30),
        ])
        .unwrap();
        let scaled = NormalizedFramerates::from_device(&[
            FramerateRange::new(15000, 30000),
            FramerateRange::new(30000, 30000),
        ])
        .unwrap();

        assert_eq!(plain.unit_factor, 1000);
        assert_eq!(scaled.unit_factor, 1);
        assert_eq!(plain.ranges, scaled.ranges);
        assert_eq!(
            closest_framerate_range(&plain.ranges, 30_000),
            closest_framerate_range(&scaled.ranges, 30_000),
        );
    }

    #[test]
    fn closest_framerate_prefers_tightest_range() {
        let ranges = [
            FramerateRange::new(15000, 30000),
            FramerateRange::new(30000, 30000),
        ];
        assert_eq!(
            closest_framerate_range(&ranges, 30_000),
            Some(FramerateRange::new(30000, 30000))
        );
        assert_eq!(
            closest_framerate_range(&ranges, 20_000),
            Some(FramerateRange::new(15000, 30000))
        );
        assert_eq!(
            closest_framerate_range(&ranges, 0),
            Some(FramerateRange::new(15000, 30000))
        );
    }

    #[test]
    fn framerate_range_orders_bounds() {
        assert_eq!(FramerateRange::new(30, 15), FramerateRange::new(15, 30));
    }

    #[test]
    fn empty_framerate_list_does_not_normalize() {
        assert!(NormalizedFramerates::from_device(&[]).is_none());
    }

    #[test]
    fn depth_only_camera_is_unsupported() {
        let mut characteristics = crate::shared::simulated::default_characteristics();
        assert!(negotiate(&characteristics, 640, 480, 30).is_ok());

        characteristics
            .capabilities
            .retain(|capability| *capability != RequestCapability::BackwardCompatible);
        let err = negotiate(&characteristics, 640, 480, 30).unwrap_err();
        assert!(matches!(err, CameraError::Unsupported(_)));
        assert_eq!(err.category(), crate::shared::ErrorCategory::Usage);
    }
}
