// THEORY:
// The `FrameSource` is the producer end of the pipeline. It owns one
// `VideoBackend` and one capture thread, and its only output is the bounded
// frame channel.
//
// Key architectural principles:
// 1.  **Backend as a Capability**: Decoding is not our concern. Anything that can
//     open a descriptor and hand back RGB images implements `VideoBackend`, so
//     the same loop drives a webcam, a video file, a network stream or a folder
//     of stills.
// 2.  **Classify Once**: The descriptor is classified up front (`SourceKind`),
//     and the kind alone decides what a failed read means: a network stream
//     reconnects, a file ends or rewinds, a local device ends.
// 3.  **Backpressure, Not Buffering**: Each frame is pushed into a bounded
//     channel and the capture thread blocks while it is full. A slow detector
//     therefore slows capture instead of growing memory.
// 4.  **Cooperative Stop**: `stop()` clears the running flag, wakes any backoff or
//     pacing sleep, shuts the frame channel down to release a blocked push, then
//     joins the thread and releases the backend. Nothing is ever interrupted
//     mid-read.

mod image_sequence;

pub use image_sequence::ImageSequenceBackend;

use crate::channel::BoundedChannel;
use crate::error::SourceError;
use crate::frame::{Frame, monotonic_millis};
use crate::worker;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Pacing rate when neither the backend nor the settings give a usable one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Something that can open a video descriptor and decode frames from it.
pub trait VideoBackend: Send {
    /// Opens `descriptor`. Returns whether the backend is now ready to read.
    fn open(&mut self, descriptor: &str) -> bool;

    fn is_opened(&self) -> bool;

    /// Decodes the next frame, or `None` when no frame could be read.
    fn read(&mut self) -> Option<RgbImage>;

    fn release(&mut self);

    /// Native frame rate, if the backend knows it.
    fn fps(&self) -> Option<f64> {
        None
    }

    /// Rewinds to the first frame. Returns `false` when unsupported.
    fn seek_to_start(&mut self) -> bool {
        false
    }
}

impl VideoBackend for Box<dyn VideoBackend> {
    fn open(&mut self, descriptor: &str) -> bool {
        (**self).open(descriptor)
    }

    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn read(&mut self) -> Option<RgbImage> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn fps(&self) -> Option<f64> {
        (**self).fps()
    }

    fn seek_to_start(&mut self) -> bool {
        (**self).seek_to_start()
    }
}

/// What a source descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A camera index such as `"0"`.
    LocalDevice,
    /// A path on disk.
    File,
    /// A `scheme://` URL such as `rtsp://` or `https://`.
    NetworkStream,
}

impl SourceKind {
    pub fn classify(descriptor: &str) -> Self {
        if !descriptor.is_empty() && descriptor.bytes().all(|b| b.is_ascii_digit()) {
            return Self::LocalDevice;
        }
        let is_url = descriptor.split_once("://").is_some_and(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        });
        if is_url { Self::NetworkStream } else { Self::File }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalDevice => "device",
            Self::File => "file",
            Self::NetworkStream => "network stream",
        })
    }
}

/// What a file source does when it runs out of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// End the capture loop.
    Stop,
    /// Rewind to the first frame and keep going.
    #[default]
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub replay: ReplayMode,
    /// Sleep out the remainder of each frame interval after pushing a frame.
    pub pacing: bool,
    /// Wait before reopening a network stream after a failed read.
    pub reconnect_backoff: Duration,
    /// Frame rate used for pacing when the backend does not report one.
    pub default_fps: f64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            replay: ReplayMode::default(),
            pacing: true,
            reconnect_backoff: Duration::from_secs(1),
            default_fps: DEFAULT_FPS,
        }
    }
}

/// Captures frames from a backend on a dedicated thread and feeds them into a
/// `BoundedChannel`.
pub struct FrameSource {
    descriptor: String,
    kind: SourceKind,
    settings: SourceSettings,
    channel: BoundedChannel<Frame>,
    backend: Option<Box<dyn VideoBackend>>,
    worker: Option<JoinHandle<Option<Box<dyn VideoBackend>>>>,
    running: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    captured: Arc<AtomicU64>,
    stopped: bool,
}

impl FrameSource {
    pub fn new(
        descriptor: impl Into<String>,
        backend: impl VideoBackend + 'static,
        channel: BoundedChannel<Frame>,
        settings: SourceSettings,
    ) -> Self {
        let descriptor = descriptor.into();
        Self {
            kind: SourceKind::classify(&descriptor),
            descriptor,
            settings,
            channel,
            backend: Some(Box::new(backend)),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            wake: None,
            captured: Arc::new(AtomicU64::new(0)),
            stopped: false,
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Opens the backend and spawns the capture thread.
    ///
    /// An open failure is returned immediately, without retrying and without
    /// spawning anything.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.worker.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        if self.stopped {
            return Err(SourceError::Stopped);
        }
        let Some(mut backend) = self.backend.take() else {
            return Err(SourceError::Stopped);
        };

        if !backend.open(&self.descriptor) {
            tracing::warn!(descriptor = %self.descriptor, kind = %self.kind, "failed to open video source");
            backend.release();
            self.backend = Some(backend);
            return Err(SourceError::Open {
                descriptor: self.descriptor.clone(),
            });
        }

        let usable = |fps: &f64| fps.is_finite() && *fps > 0.0;
        let fps = backend
            .fps()
            .filter(usable)
            .or(Some(self.settings.default_fps).filter(usable))
            .unwrap_or(DEFAULT_FPS);
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(0);
        self.running.store(true, Ordering::SeqCst);

        let capture = CaptureLoop {
            backend,
            descriptor: self.descriptor.clone(),
            kind: self.kind,
            settings: self.settings.clone(),
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            channel: self.channel.clone(),
            running: Arc::clone(&self.running),
            wake: wake_rx,
            captured: Arc::clone(&self.captured),
        };
        let handle = match worker::spawn_owned("frame-source", capture, CaptureLoop::run) {
            Ok(handle) => handle,
            Err((err, capture)) => {
                self.running.store(false, Ordering::SeqCst);
                let mut backend = capture.backend;
                backend.release();
                self.backend = Some(backend);
                return Err(SourceError::Spawn(err));
            }
        };

        tracing::info!(descriptor = %self.descriptor, kind = %self.kind, fps, "frame source started");
        self.worker = Some(handle);
        self.wake = Some(wake_tx);
        Ok(())
    }

    /// Stops capturing, shuts the frame channel down, joins the capture thread
    /// and releases the backend. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.running.store(false, Ordering::SeqCst);
        self.wake.take();
        self.channel.shutdown();

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(Some(mut backend)) => {
                    backend.release();
                    self.backend = Some(backend);
                }
                Ok(None) => {}
                Err(_) => tracing::error!(descriptor = %self.descriptor, "capture thread panicked"),
            }
        } else if let Some(backend) = self.backend.as_mut() {
            backend.release();
        }
        tracing::info!(
            descriptor = %self.descriptor,
            frames = self.frames_captured(),
            "frame source stopped"
        );
    }

    /// Whether the capture thread is still alive. Turns false on its own when
    /// the loop ends, for example at the end of a non-looping file.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Frames successfully pushed into the channel so far.
    pub fn frames_captured(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the capture thread. The backend is handed back when the
/// loop ends.
struct CaptureLoop {
    backend: Box<dyn VideoBackend>,
    descriptor: String,
    kind: SourceKind,
    settings: SourceSettings,
    frame_interval: Duration,
    channel: BoundedChannel<Frame>,
    running: Arc<AtomicBool>,
    wake: Receiver<()>,
    captured: Arc<AtomicU64>,
}

impl CaptureLoop {
    fn run(mut self) -> Box<dyn VideoBackend> {
        let mut next_id = 0u64;
        let mut since_rewind = 0u64;

        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let Some(image) = self.backend.read() else {
                if self.recover(since_rewind) {
                    since_rewind = 0;
                    continue;
                }
                break;
            };

            let frame = Frame::new(image, next_id, monotonic_millis());
            tracing::trace!(frame_id = next_id, queued = self.channel.len(), "pushing frame");
            if self.channel.push(frame).is_err() {
                tracing::debug!("frame channel closed, capture loop exiting");
                break;
            }
            next_id += 1;
            since_rewind += 1;
            self.captured.fetch_add(1, Ordering::SeqCst);

            if self.settings.pacing {
                let remaining = self.frame_interval.saturating_sub(started.elapsed());
                if !remaining.is_zero() && !self.sleep(remaining) {
                    break;
                }
            }
        }

        tracing::debug!(descriptor = %self.descriptor, frames = next_id, "capture loop finished");
        self.backend
    }

    /// Handles a failed read. Returns whether the loop should keep going.
    fn recover(&mut self, since_rewind: u64) -> bool {
        match self.kind {
            SourceKind::NetworkStream => {
                tracing::warn!(
                    descriptor = %self.descriptor,
                    backoff = ?self.settings.reconnect_backoff,
                    "read failed, reconnecting"
                );
                if !self.sleep(self.settings.reconnect_backoff) {
                    return false;
                }
                self.backend.release();
                if !self.backend.open(&self.descriptor) {
                    tracing::warn!(descriptor = %self.descriptor, "reconnect failed");
                }
                true
            }
            SourceKind::File => match self.settings.replay {
                ReplayMode::Stop => {
                    tracing::info!(descriptor = %self.descriptor, "end of stream");
                    false
                }
                // A rewind that yields nothing would spin forever.
                ReplayMode::Loop if since_rewind == 0 => {
                    tracing::warn!(descriptor = %self.descriptor, "no frames after rewind");
                    false
                }
                ReplayMode::Loop => {
                    let rewound = self.backend.seek_to_start();
                    if rewound {
                        tracing::debug!(descriptor = %self.descriptor, "rewound to first frame");
                    } else {
                        tracing::warn!(descriptor = %self.descriptor, "source cannot rewind");
                    }
                    rewound
                }
            },
            SourceKind::LocalDevice => {
                tracing::warn!(descriptor = %self.descriptor, "device read failed");
                false
            }
        }
    }

    /// Sleeps for `duration` unless stopped first. Returns whether to continue.
    fn sleep(&self, duration: Duration) -> bool {
        match self.wake.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.running.load(Ordering::SeqCst),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
