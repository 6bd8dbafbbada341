//! Region-of-interest geometry: the normalized specification a caller edits,
//! and the pixel rectangle it resolves to for a given frame size.

use serde::{Deserialize, Serialize};

/// Smallest accepted width or height ratio. Narrower requests are raised to it.
pub const MIN_ROI_RATIO: f32 = 0.05;

/// A rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// One past the last column covered.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the last row covered.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Where the ROI sits, relative to the frame. All four values are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSpec {
    pub center_x: f32,
    pub center_y: f32,
    pub width_ratio: f32,
    pub height_ratio: f32,
}

impl Default for RoiSpec {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.6,
            width_ratio: 0.3,
            height_ratio: 0.8,
        }
    }
}

impl RoiSpec {
    /// Builds a spec and normalizes it immediately.
    pub fn new(center_x: f32, center_y: f32, width_ratio: f32, height_ratio: f32) -> Self {
        Self {
            center_x,
            center_y,
            width_ratio,
            height_ratio,
        }
        .normalized()
    }

    /// Clamps every field into `[0, 1]` and raises the size ratios to
    /// `MIN_ROI_RATIO`. Non-finite values fall back to the default spec's.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let unit = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        Self {
            center_x: unit(self.center_x, defaults.center_x),
            center_y: unit(self.center_y, defaults.center_y),
            width_ratio: unit(self.width_ratio, defaults.width_ratio).max(MIN_ROI_RATIO),
            height_ratio: unit(self.height_ratio, defaults.height_ratio).max(MIN_ROI_RATIO),
        }
    }

    /// Resolves the spec against a frame size. The result always lies fully
    /// inside the frame and is at least one pixel in each dimension, unless the
    /// frame itself is empty.
    pub fn resolve(&self, frame_width: u32, frame_height: u32) -> PixelRect {
        if frame_width == 0 || frame_height == 0 {
            return PixelRect::default();
        }
        let spec = self.normalized();

        let width = scaled(frame_width, spec.width_ratio).clamp(1, frame_width);
        let height = scaled(frame_height, spec.height_ratio).clamp(1, frame_height);
        let x = offset(frame_width, spec.center_x, width);
        let y = offset(frame_height, spec.center_y, height);

        PixelRect {
            x,
            y,
            width,
            height,
        }
    }
}

fn scaled(extent: u32, ratio: f32) -> u32 {
    (f64::from(extent) * f64::from(ratio)) as u32
}

/// Top-left coordinate for a span of `size` centred at `center` (a ratio of
/// `extent`), pushed back inside `[0, extent - size]`.
fn offset(extent: u32, center: f32, size: u32) -> u32 {
    let start = (f64::from(extent) * f64::from(center) - f64::from(size / 2)) as i64;
    start.clamp(0, i64::from(extent - size)) as u32
}
