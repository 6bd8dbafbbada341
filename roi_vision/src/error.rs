//! Error types for the capture, detection and export stages.
//!
//! None of these are fatal to the process. Channel closure in particular is the
//! normal way a shutdown propagates between threads.

use std::io;

/// Returned by a push onto a channel that has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel has been shut down")]
pub struct ChannelClosed;

/// Failures surfaced by `FrameSource::start`.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The backend could not open the descriptor. No capture thread was spawned.
    #[error("failed to open video source `{descriptor}`")]
    Open { descriptor: String },

    #[error("frame source is already running")]
    AlreadyRunning,

    /// `stop` has been called; the frame channel is shut down for good.
    #[error("frame source has been stopped")]
    Stopped,

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Failures while writing the event log.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write motion log: {0}")]
    Io(#[from] io::Error),
}

/// Failures while loading a detector configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures while spawning the processing thread.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("processing loop is already running")]
    AlreadyRunning,

    /// The detector has already been handed back by `stop`.
    #[error("processing loop has been stopped")]
    Stopped,

    #[error("failed to spawn processing thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Failures while loading the overlay font.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("failed to read font file: {0}")]
    Io(#[from] io::Error),

    #[error("not a usable font: {0}")]
    Invalid(#[from] ab_glyph::InvalidFont),
}
