use anyhow::Context;
use roi_vision::{
    BoundedChannel, DetectionResult, DetectorConfig, Frame, FrameSource, LatestChannel,
    MotionDetector, OverlayFont, ProcessingLoop, SourceSettings, VideoBackend,
};

/// Everything one run owns: both worker stages and the channels the consumer
/// talks to.
pub struct Pipeline {
    source: FrameSource,
    processing: ProcessingLoop,
    frames: BoundedChannel<Frame>,
    configs: LatestChannel<DetectorConfig>,
    results: LatestChannel<DetectionResult>,
}

impl Pipeline {
    /// Starts detection first, then capture, so no captured frame waits on a
    /// detector that is not there yet.
    pub fn start(
        descriptor: &str,
        backend: Box<dyn VideoBackend>,
        settings: SourceSettings,
        queue_capacity: usize,
        config: DetectorConfig,
        font: Option<OverlayFont>,
    ) -> anyhow::Result<Self> {
        let frames = BoundedChannel::new(queue_capacity);
        let configs = LatestChannel::new();
        let results = LatestChannel::new();

        let mut processing = ProcessingLoop::new(
            MotionDetector::with_config(config),
            frames.clone(),
            configs.clone(),
            results.clone(),
        );
        if let Some(font) = font {
            processing = processing.with_overlay(font);
        }
        processing.start().context("failed to start processing loop")?;

        let mut source = FrameSource::new(descriptor, backend, frames.clone(), settings);
        if let Err(err) = source.start() {
            processing.stop();
            return Err(err).context("failed to start frame source");
        }

        Ok(Self {
            source,
            processing,
            frames,
            configs,
            results,
        })
    }

    pub fn configs(&self) -> &LatestChannel<DetectorConfig> {
        &self.configs
    }

    pub fn results(&self) -> &LatestChannel<DetectionResult> {
        &self.results
    }

    /// True once the source has stopped producing and every captured frame
    /// has been taken off the channel.
    pub fn is_drained(&self) -> bool {
        !self.source.is_running() && self.frames.is_empty()
    }

    /// Stops detection, then capture, and returns the detector with the
    /// complete history of the run.
    pub fn shutdown(mut self) -> anyhow::Result<MotionDetector> {
        let detector = self.processing.stop();
        self.source.stop();
        tracing::info!(frames = self.source.frames_captured(), "pipeline stopped");
        detector.context("processing thread did not return the detector")
    }
}
