// This is free and unencumbered software released into the public domain.

use crate::shared::Size;
use bytes::Bytes;
use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[display("YUV_420_888")]
    Yuv420,
    #[display("JPEG")]
    Jpeg,
    #[display("RAW_SENSOR")]
    RawSensor,
}

impl PixelFormat {
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Yuv420 => 3,
            Self::Jpeg | Self::RawSensor => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Plane {
    pub data: Bytes,
    pub row_stride: u32,
    pub pixel_stride: u32,
}

/// An image as acquired from a reader surface.
#[derive(Clone, Debug)]
pub struct Image {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
    pub timestamp_ns: i64,
}

impl Image {
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// A validated preview frame handed to the sink.
///
/// Plane buffers are reference-counted, so cloning the frame is cheap.
#[derive(Clone, Debug)]
pub struct Frame {
    pub planes: Vec<Plane>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation, in degrees, needed to display the frame upright.
    pub rotation: u32,
    pub timestamp_ns: i64,
    pub pixel_format: PixelFormat,
}

impl Frame {
    pub fn from_image(image: Image, rotation: u32) -> Self {
        Self {
            planes: image.planes,
            width: image.width,
            height: image.height,
            rotation,
            timestamp_ns: image.timestamp_ns,
            pixel_format: image.format,
        }
    }

    pub fn data_len(&self) -> usize {
        self.planes.iter().map(|plane| plane.data.len()).sum()
    }
}
