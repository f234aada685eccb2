// This is free and unencumbered software released into the public domain.

use derive_more::Display;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
#[display("{width}x{height}")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Pixel rectangle in sensor coordinates; `right`/`bottom` are exclusive.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
#[display("Rect({left}, {top} - {right}, {bottom})")]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }
}

pub const METERING_WEIGHT_MAX: u32 = 1000;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[display("MeteringRectangle({x}, {y} {width}x{height}, weight {weight})")]
pub struct MeteringRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: u32,
}
