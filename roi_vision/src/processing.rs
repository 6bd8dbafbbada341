// THEORY:
// The `ProcessingLoop` is the consumer end of the frame channel and the
// producer end of the result channel. It owns the `MotionDetector` outright:
// the detector is moved onto the processing thread by `start` and moved back
// out by `stop`, which is what lets the detector mutate its background model
// and history without any locking.
//
// Each iteration does three things, in order:
// 1.  **Apply Config**: Drain the config channel and apply only the newest
//     value. A burst of edits from a UI collapses into a single `set_config`.
// 2.  **Wait for a Frame**: Pop from the frame channel with a short timeout so
//     the stop flag is re-checked regularly. A timeout and a closed channel are
//     treated the same.
// 3.  **Detect and Publish**: Run the detector, annotate the visualization with
//     the frame's statistics and push the result onto the latest-wins result
//     channel, where a slow consumer only ever sees the newest one.

use crate::channel::{BoundedChannel, LatestChannel};
use crate::config::DetectorConfig;
use crate::detector::MotionDetector;
use crate::error::ProcessingError;
use crate::event::{DetectionResult, MotionEvent};
use crate::frame::Frame;
use crate::overlay::OverlayFont;
use crate::worker;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything one iteration needs. Lives on the processing thread while the
/// loop runs.
struct Processor {
    detector: MotionDetector,
    frames: BoundedChannel<Frame>,
    configs: LatestChannel<DetectorConfig>,
    results: LatestChannel<DetectionResult>,
    overlay: Option<OverlayFont>,
    pop_timeout: Duration,
    /// Disconnects when the owning `ProcessingLoop` halts.
    stop: Receiver<()>,
}

impl Processor {
    fn run_once(&mut self) -> Option<MotionEvent> {
        if let Some(config) = self.configs.try_pop_latest() {
            self.detector.set_config(config);
        }

        let frame = self.frames.pop_interruptible(self.pop_timeout, &self.stop)?;
        let event = self.detector.process_frame(&frame);

        let mut visualization = self.detector.take_visualization().unwrap_or(frame.image);
        if let Some(font) = &self.overlay {
            font.draw_stats(&mut visualization, &event);
            if self.detector.config().draw_roi() && !event.roi.is_empty() {
                font.draw_roi_label(&mut visualization, &event);
            }
        }

        self.results.push(DetectionResult {
            visualization,
            event: event.clone(),
        });
        Some(event)
    }

    fn run(mut self, running: &AtomicBool) -> Self {
        tracing::info!("processing loop started");
        while running.load(Ordering::SeqCst) {
            if self.run_once().is_some() || !self.frames.is_shutdown() {
                continue;
            }
            // Nothing more will arrive; wait to be stopped.
            match self.stop.recv_timeout(self.pop_timeout) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!(events = self.detector.history().len(), "processing loop stopped");
        self
    }
}

/// Drives a `MotionDetector` from a frame channel on a dedicated thread.
pub struct ProcessingLoop {
    processor: Option<Processor>,
    worker: Option<JoinHandle<Option<Processor>>>,
    running: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
}

impl ProcessingLoop {
    pub fn new(
        detector: MotionDetector,
        frames: BoundedChannel<Frame>,
        configs: LatestChannel<DetectorConfig>,
        results: LatestChannel<DetectionResult>,
    ) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        Self {
            processor: Some(Processor {
                detector,
                frames,
                configs,
                results,
                overlay: None,
                pop_timeout: DEFAULT_POP_TIMEOUT,
                stop: stop_rx,
            }),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            stop: Some(stop_tx),
        }
    }

    /// Draws the statistics line (and the ROI label) onto every published
    /// visualization. Without a font, results carry the statistics only.
    pub fn with_overlay(mut self, font: OverlayFont) -> Self {
        if let Some(processor) = self.processor.as_mut() {
            processor.overlay = Some(font);
        }
        self
    }

    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        if let Some(processor) = self.processor.as_mut() {
            processor.pop_timeout = timeout;
        }
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The detector, while the loop is not running.
    pub fn detector(&self) -> Option<&MotionDetector> {
        self.processor.as_ref().map(|p| &p.detector)
    }

    /// Moves the detector onto a new processing thread.
    pub fn start(&mut self) -> Result<(), ProcessingError> {
        if self.worker.is_some() {
            return Err(ProcessingError::AlreadyRunning);
        }
        let processor = self.processor.take().ok_or(ProcessingError::Stopped)?;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        match worker::spawn_owned("processing", processor, move |p| p.run(&running)) {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err((err, processor)) => {
                self.running.store(false, Ordering::SeqCst);
                self.processor = Some(processor);
                Err(ProcessingError::Spawn(err))
            }
        }
    }

    /// Stops the thread and hands the detector, with its full history, back
    /// to the caller. Returns `None` if it was already handed back.
    ///
    /// The frame channel is left alone; shutting it down is the frame
    /// source's job.
    pub fn stop(&mut self) -> Option<MotionDetector> {
        self.halt();
        self.processor.take().map(|p| p.detector)
    }

    /// Runs a single iteration on the calling thread. Returns the event if a
    /// frame was processed.
    pub fn run_once(&mut self) -> Result<Option<MotionEvent>, ProcessingError> {
        if self.worker.is_some() {
            return Err(ProcessingError::AlreadyRunning);
        }
        let processor = self.processor.as_mut().ok_or(ProcessingError::Stopped)?;
        Ok(processor.run_once())
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.take();
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(processor) => self.processor = processor,
                Err(_) => tracing::error!("processing thread panicked"),
            }
        }
    }
}

impl Drop for ProcessingLoop {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roi::RoiSpec;
    use image::{Rgb, RgbImage};
    use std::thread;
    use std::time::Instant;

    struct Harness {
        frames: BoundedChannel<Frame>,
        configs: LatestChannel<DetectorConfig>,
        results: LatestChannel<DetectionResult>,
        processing: ProcessingLoop,
    }

    fn harness() -> Harness {
        let frames = BoundedChannel::new(8);
        let configs = LatestChannel::new();
        let results = LatestChannel::new();
        let processing = ProcessingLoop::new(
            MotionDetector::new(),
            frames.clone(),
            configs.clone(),
            results.clone(),
        )
        .with_pop_timeout(Duration::from_millis(10));
        Harness {
            frames,
            configs,
            results,
            processing,
        }
    }

    fn frame(id: u64) -> Frame {
        Frame::new(RgbImage::from_pixel(64, 48, Rgb([0, 0, 0])), id, id as i64 * 33)
    }

    #[test]
    fn run_once_publishes_a_result() {
        let mut h = harness();
        h.frames.push(frame(0)).expect("push frame");

        let event = h.processing.run_once().expect("loop idle").expect("frame processed");
        assert_eq!(event.frame_id, 0);

        let result = h.results.try_pop_latest().expect("published result");
        assert_eq!(result.event, event);
        assert_eq!(result.visualization.dimensions(), (64, 48));
    }

    #[test]
    fn run_once_times_out_without_frames() {
        let mut h = harness();
        assert_eq!(h.processing.run_once().expect("loop idle"), None);
        assert!(h.results.is_empty());
    }

    #[test]
    fn pending_config_is_applied_before_the_next_frame() {
        let mut h = harness();
        let stale = DetectorConfig::builder().threshold(5).build();
        let fresh = DetectorConfig::builder()
            .threshold(70)
            .roi(RoiSpec::new(0.5, 0.5, 0.5, 0.5))
            .build();
        h.configs.push(stale);
        h.configs.push(fresh.clone());
        h.frames.push(frame(0)).expect("push frame");

        h.processing.run_once().expect("loop idle");

        let detector = h.processing.detector().expect("detector available");
        assert_eq!(detector.config(), &fresh);
        assert!(h.configs.is_empty());
    }

    #[test]
    fn threaded_loop_returns_the_detector_with_full_history() {
        let mut h = harness();
        h.processing.start().expect("loop starts");
        assert!(matches!(h.processing.start(), Err(ProcessingError::AlreadyRunning)));

        for id in 0..5 {
            h.frames.push(frame(id)).expect("push frame");
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while h.frames.len() > 0 || h.results.len() == 0 {
            assert!(Instant::now() < deadline, "frames were not consumed");
            thread::sleep(Duration::from_millis(5));
        }
        // The last frame may still be inside `process`.
        thread::sleep(Duration::from_millis(100));

        let detector = h.processing.stop().expect("detector handed back");
        assert_eq!(detector.history().len(), 5);
        let ids: Vec<u64> = detector.history().events().iter().map(|e| e.frame_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let latest = h.results.try_pop_latest().expect("published result");
        assert_eq!(latest.event.frame_id, 4);

        assert!(h.processing.stop().is_none());
        assert!(matches!(h.processing.run_once(), Err(ProcessingError::Stopped)));
    }

    #[test]
    fn stops_promptly_after_the_frame_channel_closes() {
        let mut h = harness();
        h.processing = ProcessingLoop::new(
            MotionDetector::new(),
            h.frames.clone(),
            h.configs.clone(),
            h.results.clone(),
        )
        .with_pop_timeout(Duration::from_secs(10));
        h.processing.start().expect("loop starts");
        thread::sleep(Duration::from_millis(20));
        h.frames.shutdown();

        let started = Instant::now();
        assert!(h.processing.stop().is_some());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn stops_promptly_while_waiting_on_an_open_channel() {
        let mut h = harness();
        h.processing = ProcessingLoop::new(
            MotionDetector::new(),
            h.frames.clone(),
            h.configs.clone(),
            h.results.clone(),
        )
        .with_pop_timeout(Duration::from_secs(10));
        h.processing.start().expect("loop starts");
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(h.processing.stop().is_some());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!h.frames.is_shutdown());
    }

    #[test]
    fn published_visualization_is_moved_out_of_the_detector() {
        let mut h = harness();
        h.frames.push(frame(0)).expect("push frame");
        h.processing.run_once().expect("loop idle").expect("frame processed");

        let result = h.results.try_pop_latest().expect("published result");
        assert_eq!(result.visualization.dimensions(), (64, 48));
        let detector = h.processing.stop().expect("detector handed back");
        assert!(detector.visualization().is_none());
    }
}
