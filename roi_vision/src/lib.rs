// THEORY:
// This file is the main entry point for the `roi_vision` library crate.
// It exposes the three stages of the motion pipeline and the channels that
// connect them:
//
//   FrameSource --BoundedChannel<Frame>--> ProcessingLoop --LatestChannel<DetectionResult>--> consumer
//                                              ^
//                     LatestChannel<DetectorConfig> (from the consumer)
//
// The capture and processing stages each own one thread. The consumer (a GUI,
// a CLI, a recorder) is whatever the embedding application runs; it only ever
// polls the result channel and pushes new configurations. Process-level
// concerns such as signals and argument parsing belong to the embedding binary,
// never to this crate.

pub mod channel;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod frame;
pub mod history;
pub mod overlay;
pub mod processing;
pub mod roi;
pub mod source;
mod worker;

pub use channel::{BoundedChannel, LatestChannel};
pub use config::{DetectorConfig, DetectorConfigBuilder, RoiResetPolicy};
pub use detector::{DetectorState, MotionDetector};
pub use error::{ChannelClosed, ConfigError, ExportError, FontError, ProcessingError, SourceError};
pub use event::{DetectionResult, MotionEvent};
pub use frame::Frame;
pub use history::{EventHistory, HistorySummary};
pub use overlay::OverlayFont;
pub use processing::ProcessingLoop;
pub use roi::{PixelRect, RoiSpec};
pub use source::{FrameSource, ImageSequenceBackend, ReplayMode, SourceKind, SourceSettings, VideoBackend};
