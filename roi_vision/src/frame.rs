use image::RgbImage;
use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// A single captured image together with its capture metadata.
///
/// The pixel buffer is owned, never shared: it moves from the capture thread
/// into the frame channel and out again to the processing thread.
pub struct Frame {
    /// The decoded pixels, 8-bit RGB.
    pub image: RgbImage,
    /// Strictly increasing per frame source, starting at 0. Never reused.
    pub frame_id: u64,
    /// Capture time in milliseconds on the process-wide monotonic clock.
    pub timestamp_ms: i64,
}

impl Frame {
    pub fn new(image: RgbImage, frame_id: u64, timestamp_ms: i64) -> Self {
        Self {
            image,
            frame_id,
            timestamp_ms,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("dimensions", &self.image.dimensions())
            .finish()
    }
}

/// Milliseconds elapsed on a monotonic clock whose zero is the first call in
/// this process. Never goes backwards.
pub fn monotonic_millis() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    i64::try_from(epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
}
