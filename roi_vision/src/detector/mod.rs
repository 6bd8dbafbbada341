// THEORY:
// The `MotionDetector` is the algorithmic core of the pipeline. It compares each
// frame against a slowly adapting model of the empty scene, restricted to the
// region of interest, and reports how much of the frame is covered by changes.
//
// Key architectural principles & algorithm steps:
// 1.  **ROI First**: Every frame is cropped to the resolved ROI before any other
//     work, so the cost of detection scales with the ROI and not with the frame.
// 2.  **Seed, Then Track**: The detector is a two-state machine. While
//     `Uninitialized`, the next frame seeds the background model and yields a
//     zero event. Once `Tracking`, each frame is blurred, differenced against the
//     background, thresholded, dilated and split into outer contours.
// 3.  **Area Scoring**: Contours smaller than the configured minimum are noise.
//     The remaining areas are summed and expressed as a percentage of the full
//     frame area, which is the `motion_score`.
// 4.  **Continuous Adaptation**: After every tracking frame, motion or not, the
//     background absorbs the new frame by exponential moving average, so lighting
//     drift and objects that come to rest fade into the scene.
// 5.  **Geometry Owns the Model**: The background is only meaningful for the ROI
//     it was built from. Moving or resizing the ROI discards it and the next frame
//     reseeds. Tuning the threshold, blur, minimum area or learning rate keeps it.
// 6.  **Single Owner**: The detector is moved into the processing thread and
//     handed back when the thread stops, so it carries no locks of its own.

mod background;
mod imaging;

pub use background::BackgroundModel;

use crate::config::DetectorConfig;
use crate::error::ExportError;
use crate::event::MotionEvent;
use crate::frame::Frame;
use crate::history::EventHistory;
use crate::roi::{PixelRect, RoiSpec};
use image::{GrayImage, RgbImage};
use std::path::Path;

/// Whether the detector has a background model to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// The next frame will seed the background.
    Uninitialized,
    /// Frames are compared against the background.
    Tracking,
}

pub struct MotionDetector {
    config: DetectorConfig,
    background: Option<BackgroundModel>,
    visualization: Option<RgbImage>,
    history: EventHistory,
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            config,
            background: None,
            visualization: None,
            history: EventHistory::new(),
        }
    }

    pub fn state(&self) -> DetectorState {
        match self.background {
            Some(_) => DetectorState::Tracking,
            None => DetectorState::Uninitialized,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn roi(&self) -> RoiSpec {
        self.config.roi()
    }

    pub fn background(&self) -> Option<&BackgroundModel> {
        self.background.as_ref()
    }

    /// The annotated copy of the most recently processed frame.
    pub fn visualization(&self) -> Option<&RgbImage> {
        self.visualization.as_ref()
    }

    /// Moves the latest visualization out, leaving none until the next frame.
    pub fn take_visualization(&mut self) -> Option<RgbImage> {
        self.visualization.take()
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn into_history(self) -> EventHistory {
        self.history
    }

    /// Replaces the ROI. The background is always discarded.
    pub fn set_roi(&mut self, roi: RoiSpec) {
        self.config = self.config.with_roi(roi);
        self.reset_background();
    }

    /// Replaces the whole configuration. The background is discarded only if
    /// the new config's reset policy says the ROI changed.
    pub fn set_config(&mut self, config: DetectorConfig) {
        let reset = self.config.requires_reset(&config);
        self.config = config;
        if reset {
            self.reset_background();
        }
        tracing::debug!(reset, "detector config replaced");
    }

    pub fn reset_background(&mut self) {
        if self.background.take().is_some() {
            tracing::debug!("background model reset");
        }
    }

    pub fn process_frame(&mut self, frame: &Frame) -> MotionEvent {
        self.process(&frame.image, frame.frame_id, frame.timestamp_ms)
    }

    /// Runs detection on one frame, records the event in the history and
    /// returns it. The annotated frame is available from `visualization`.
    pub fn process(&mut self, image: &RgbImage, frame_id: u64, timestamp_ms: i64) -> MotionEvent {
        let (width, height) = image.dimensions();
        let rect = self.config.roi().resolve(width, height);
        if rect.is_empty() {
            tracing::warn!(frame_id, "skipping empty frame");
            let event = MotionEvent::idle(frame_id, timestamp_ms, rect);
            self.visualization = Some(image.clone());
            self.history.push(event.clone());
            return event;
        }

        let blurred = imaging::blur(imaging::crop_gray(image, rect), self.config.blur_kernel());

        let event = match self.background.take() {
            Some(mut background) if background.matches(&blurred) => {
                let found = detect(&self.config, image, rect, &blurred, &background);
                background.accumulate(&blurred, self.config.learning_rate());
                self.background = Some(background);
                self.visualization = Some(found.visualization);
                tracing::debug!(
                    frame_id,
                    motion_score = found.motion_score,
                    contour_count = found.contour_count,
                    "frame processed"
                );
                MotionEvent {
                    frame_id,
                    timestamp_ms,
                    motion_score: found.motion_score,
                    contour_count: found.contour_count,
                    roi: rect,
                    largest_bbox: found.largest_bbox,
                }
            }
            _ => {
                self.background = Some(BackgroundModel::seed(&blurred));
                let mut visualization = image.clone();
                if self.config.draw_roi() {
                    imaging::draw_roi(&mut visualization, rect);
                }
                self.visualization = Some(visualization);
                tracing::debug!(frame_id, ?rect, "background seeded");
                MotionEvent::idle(frame_id, timestamp_ms, rect)
            }
        };

        self.history.push(event.clone());
        event
    }

    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.history.export_csv(path)
    }
}

/// What the tracking half of `process` found in one frame.
struct Detection {
    motion_score: f64,
    contour_count: u32,
    largest_bbox: Option<PixelRect>,
    visualization: RgbImage,
}

/// Differences `blurred` against the background, scores the qualifying
/// contours and draws them onto a copy of `image`.
fn detect(
    config: &DetectorConfig,
    image: &RgbImage,
    rect: PixelRect,
    blurred: &GrayImage,
    background: &BackgroundModel,
) -> Detection {
    let mask = imaging::threshold_difference(blurred, background.values(), config.threshold());
    let mask = imaging::dilate(mask);

    let mut visualization = image.clone();
    let mut contour_count = 0u32;
    let mut total_area = 0.0;
    let mut largest: Option<(f64, PixelRect)> = None;

    for contour in imaging::external_contours(&mask) {
        let area = imaging::polygon_area(&contour);
        if area < config.min_contour_area() {
            continue;
        }
        contour_count += 1;
        total_area += area;
        imaging::draw_contour(&mut visualization, &contour, rect.x, rect.y);

        if largest.is_none_or(|(best, _)| area > best) {
            largest = imaging::bounding_rect(&contour, rect.x, rect.y).map(|bbox| (area, bbox));
        }
    }

    if config.draw_roi() {
        imaging::draw_roi(&mut visualization, rect);
    }

    let frame_area = f64::from(image.width()) * f64::from(image.height());
    Detection {
        motion_score: total_area / frame_area * 100.0,
        contour_count,
        largest_bbox: largest.map(|(_, bbox)| bbox),
        visualization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoiResetPolicy;
    use image::Rgb;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn black_frame() -> RgbImage {
        RgbImage::from_pixel(640, 480, BLACK)
    }

    /// A black VGA frame with a white square whose top-left corner is at (x, y).
    fn frame_with_square(x: u32, y: u32, side: u32) -> RgbImage {
        let mut frame = black_frame();
        for py in y..y + side {
            for px in x..x + side {
                frame.put_pixel(px, py, WHITE);
            }
        }
        frame
    }

    #[test]
    fn first_frame_seeds_the_background() {
        let mut detector = MotionDetector::new();
        assert_eq!(detector.state(), DetectorState::Uninitialized);

        let event = detector.process(&frame_with_square(270, 200, 100), 0, 0);

        assert_eq!(event.motion_score, 0.0);
        assert_eq!(event.contour_count, 0);
        assert_eq!(event.roi, PixelRect::new(224, 96, 192, 384));
        assert_eq!(detector.state(), DetectorState::Tracking);
        assert_eq!(detector.history().len(), 1);
        let background = detector.background().expect("seeded background");
        assert_eq!(background.dimensions(), (192, 384));
    }

    #[test]
    fn identical_frames_score_zero() {
        let mut detector = MotionDetector::new();
        let frame = frame_with_square(250, 150, 60);
        detector.process(&frame, 0, 0);
        let event = detector.process(&frame, 1, 33);
        assert_eq!(event.motion_score, 0.0);
        assert_eq!(event.contour_count, 0);
        assert!(event.largest_bbox.is_none());
    }

    #[test]
    fn white_square_inside_the_roi_is_detected() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        detector.process(&black_frame(), 1, 33);
        let event = detector.process(&frame_with_square(270, 200, 100), 2, 66);

        assert!(event.contour_count >= 1);
        assert!(event.motion_score > 0.0);
        // The square covers roughly 3% of the frame; dilation makes it a little larger.
        assert!(event.motion_score > 2.5 && event.motion_score < 6.0, "{event:?}");

        let bbox = event.largest_bbox.expect("largest contour bbox");
        assert!(bbox.x <= 270 && bbox.right() >= 370, "{bbox:?}");
        assert!(bbox.y <= 200 && bbox.bottom() >= 300, "{bbox:?}");

        let viz = detector.visualization().expect("visualization");
        assert_eq!(viz.dimensions(), (640, 480));
        assert_eq!(*viz.get_pixel(224, 96), imaging::ROI_COLOR);
        let outlined = viz.pixels().filter(|p| **p == imaging::CONTOUR_COLOR).count();
        assert!(outlined > 0);
    }

    #[test]
    fn motion_outside_the_roi_is_ignored() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        let event = detector.process(&frame_with_square(10, 10, 100), 1, 33);
        assert_eq!(event.contour_count, 0);
        assert_eq!(event.motion_score, 0.0);
    }

    #[test]
    fn small_regions_fall_below_the_minimum_area() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        let event = detector.process(&frame_with_square(300, 250, 6), 1, 33);
        assert_eq!(event.contour_count, 0);
    }

    #[test]
    fn changing_the_roi_forces_a_reseed() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);

        let moved = detector.config().with_roi(RoiSpec::new(0.45, 0.6, 0.3, 0.8));
        detector.set_config(moved);
        assert_eq!(detector.state(), DetectorState::Uninitialized);

        let event = detector.process(&frame_with_square(270, 200, 100), 1, 33);
        assert_eq!(event.motion_score, 0.0);
        assert_eq!(event.contour_count, 0);
    }

    #[test]
    fn retuning_keeps_the_background() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);

        let retuned = detector.config().to_builder().threshold(40).min_contour_area(100.0).build();
        detector.set_config(retuned);
        assert_eq!(detector.state(), DetectorState::Tracking);

        let event = detector.process(&frame_with_square(270, 200, 100), 1, 33);
        assert!(event.contour_count >= 1);
        assert_eq!(detector.config().threshold(), 40);
    }

    #[test]
    fn tolerance_policy_keeps_the_background_for_small_moves() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);

        let nudged = detector
            .config()
            .to_builder()
            .roi(RoiSpec::new(0.5005, 0.6, 0.3, 0.8))
            .roi_reset_policy(RoiResetPolicy::Tolerance(0.01))
            .build();
        detector.set_config(nudged);
        assert_eq!(detector.state(), DetectorState::Tracking);
    }

    #[test]
    fn set_roi_and_reset_background_return_to_uninitialized() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        detector.set_roi(RoiSpec::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        assert_eq!(detector.roi(), RoiSpec::new(0.5, 0.5, 0.5, 0.5));

        detector.process(&black_frame(), 1, 33);
        detector.reset_background();
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        let event = detector.process(&frame_with_square(270, 200, 100), 2, 66);
        assert_eq!(event.motion_score, 0.0);
    }

    #[test]
    fn a_new_frame_size_reseeds() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        let event = detector.process(&RgbImage::from_pixel(320, 240, WHITE), 1, 33);
        assert_eq!(event.motion_score, 0.0);
        assert_eq!(event.roi, PixelRect::new(112, 48, 96, 192));
    }

    #[test]
    fn empty_frame_is_recorded_without_touching_state() {
        let mut detector = MotionDetector::new();
        let event = detector.process(&RgbImage::new(0, 0), 0, 0);
        assert_eq!(event.contour_count, 0);
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn taking_the_visualization_leaves_none_behind() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        let viz = detector.take_visualization().expect("visualization");
        assert_eq!(viz.dimensions(), (640, 480));
        assert!(detector.visualization().is_none());

        detector.process(&black_frame(), 1, 33);
        assert!(detector.visualization().is_some());
    }

    #[test]
    fn huge_kernels_from_config_still_process() {
        let config = DetectorConfig::builder().blur_kernel(u32::MAX).build();
        let mut detector = MotionDetector::with_config(config);
        detector.process(&black_frame(), 0, 0);
        let event = detector.process(&black_frame(), 1, 33);
        assert_eq!(event.motion_score, 0.0);
    }

    #[test]
    fn roi_overlay_can_be_disabled() {
        let config = DetectorConfig::builder().draw_roi(false).build();
        let mut detector = MotionDetector::with_config(config);
        detector.process(&black_frame(), 0, 0);
        let viz = detector.visualization().expect("visualization");
        assert_eq!(*viz.get_pixel(224, 96), BLACK);
    }

    #[test]
    fn export_has_one_row_per_processed_frame() {
        let mut detector = MotionDetector::new();
        detector.process(&black_frame(), 0, 0);
        detector.process(&black_frame(), 1, 33);
        detector.process(&frame_with_square(270, 200, 100), 2, 66);

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("motion_data.csv");
        detector.export_csv(&path).expect("export succeeds");

        let csv = std::fs::read_to_string(&path).expect("read export");
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("0,0,0,0,224,96,192,384"));
        assert!(rows[2].starts_with("2,66,"));
    }
}
