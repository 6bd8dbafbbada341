//! Text annotations drawn onto published visualizations.

use crate::error::FontError;
use crate::event::MotionEvent;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use std::path::Path;

const STATS_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const STATS_ORIGIN: (i32, i32) = (10, 10);

/// A loaded TrueType/OpenType font and the sizes to draw with it.
#[derive(Clone)]
pub struct OverlayFont {
    font: FontArc,
    stats_scale: PxScale,
    label_scale: PxScale,
}

impl OverlayFont {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FontError> {
        Ok(Self {
            font: FontArc::try_from_vec(bytes)?,
            stats_scale: PxScale::from(22.0),
            label_scale: PxScale::from(16.0),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FontError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn with_scale(mut self, stats: f32, label: f32) -> Self {
        self.stats_scale = PxScale::from(stats);
        self.label_scale = PxScale::from(label);
        self
    }

    /// Writes the per-frame summary line in the top-left corner.
    pub fn draw_stats(&self, canvas: &mut RgbImage, event: &MotionEvent) {
        let (x, y) = STATS_ORIGIN;
        draw_text_mut(
            canvas,
            STATS_COLOR,
            x,
            y,
            self.stats_scale,
            &self.font,
            &stats_line(event),
        );
    }

    /// Labels the ROI rectangle of `event` just inside its top-left corner.
    pub fn draw_roi_label(&self, canvas: &mut RgbImage, event: &MotionEvent) {
        let x = event.roi.x as i32 + 5;
        let y = event.roi.y as i32 + 5;
        draw_text_mut(canvas, LABEL_COLOR, x, y, self.label_scale, &self.font, "ROI");
    }
}

/// The summary text drawn by `draw_stats`.
pub fn stats_line(event: &MotionEvent) -> String {
    format!(
        "Motion: {:.2}% | Objects: {} | Frame: {}",
        event.motion_score, event.contour_count, event.frame_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::PixelRect;

    #[test]
    fn stats_line_format() {
        let event = MotionEvent {
            motion_score: 1.2345,
            contour_count: 2,
            ..MotionEvent::idle(42, 0, PixelRect::default())
        };
        assert_eq!(stats_line(&event), "Motion: 1.23% | Objects: 2 | Frame: 42");
    }

    #[test]
    fn garbage_bytes_are_not_a_font() {
        let err = OverlayFont::from_bytes(vec![0, 1, 2, 3]).err().expect("must fail");
        assert!(matches!(err, FontError::Invalid(_)));
    }

    #[test]
    fn missing_font_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = OverlayFont::from_path(dir.path().join("missing.ttf")).err().expect("must fail");
        assert!(matches!(err, FontError::Io(_)));
    }
}
