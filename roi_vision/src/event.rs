use crate::roi::PixelRect;
use image::RgbImage;
use serde::Serialize;
use std::fmt;

/// The quantitative outcome of running detection on one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionEvent {
    pub frame_id: u64,
    pub timestamp_ms: i64,
    /// Qualifying contour area as a percentage of the full frame area.
    pub motion_score: f64,
    /// Number of contours at or above the minimum area.
    pub contour_count: u32,
    /// The ROI rectangle, in frame pixels, that this frame was evaluated in.
    pub roi: PixelRect,
    /// Bounding box of the largest qualifying contour, in frame pixels.
    /// Not part of the exported record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_bbox: Option<PixelRect>,
}

impl MotionEvent {
    /// An event with no motion, as produced while the background is seeding.
    pub fn idle(frame_id: u64, timestamp_ms: i64, roi: PixelRect) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            motion_score: 0.0,
            contour_count: 0,
            roi,
            largest_bbox: None,
        }
    }

    pub fn has_motion(&self) -> bool {
        self.contour_count > 0
    }
}

/// What the processing loop publishes for each frame: the annotated image and
/// the event computed from it.
#[derive(Clone)]
pub struct DetectionResult {
    pub visualization: RgbImage,
    pub event: MotionEvent,
}

impl fmt::Debug for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionResult")
            .field("dimensions", &self.visualization.dimensions())
            .field("event", &self.event)
            .finish()
    }
}
