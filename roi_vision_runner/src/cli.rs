use clap::Parser;
use roi_vision::{ReplayMode, SourceSettings};
use std::path::PathBuf;

/// Detect motion inside a region of interest and log it to CSV.
#[derive(Debug, Clone, Parser)]
#[command(name = "roi_vision", version, about)]
pub struct Args {
    /// Camera index, video file, image directory or stream URL.
    #[arg(default_value = "0")]
    pub source: String,

    /// Where the motion log is written on exit.
    #[arg(default_value = "motion_data.csv")]
    pub output: PathBuf,

    /// JSON detector config. Edits to the file are applied while running.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Frames buffered between capture and detection.
    #[arg(long, default_value_t = 30)]
    pub queue_capacity: usize,

    /// TTF/OTF font for the on-frame statistics.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Stop at the end of a file instead of starting over.
    #[arg(long)]
    pub no_loop: bool,

    /// Read files as fast as detection allows instead of at their frame rate.
    #[arg(long)]
    pub no_pace: bool,

    /// Periodically save the latest annotated frame to this PNG.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// How often the latest result is polled, in milliseconds.
    #[arg(long, default_value_t = 16)]
    pub poll_ms: u64,
}

impl Args {
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            replay: if self.no_loop {
                ReplayMode::Stop
            } else {
                ReplayMode::Loop
            },
            pacing: !self.no_pace,
            ..SourceSettings::default()
        }
    }
}
