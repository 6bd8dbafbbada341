//! The ordered record of every event a detector produced, and its flat CSV
//! form.

use crate::error::ExportError;
use crate::event::MotionEvent;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const CSV_HEADER: &str =
    "frame_id,timestamp_ms,motion_score,contour_count,roi_x,roi_y,roi_width,roi_height";

/// Motion events in processing order. Only ever grows.
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    events: Vec<MotionEvent>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: MotionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[MotionEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&MotionEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Writes the header and one row per event. The header is written even
    /// when there are no events.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{CSV_HEADER}")?;
        for e in &self.events {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                e.frame_id,
                e.timestamp_ms,
                e.motion_score,
                e.contour_count,
                e.roi.x,
                e.roi.y,
                e.roi.width,
                e.roi.height
            )?;
        }
        out.flush()
    }

    pub fn to_csv_string(&self) -> String {
        let mut buf = Vec::with_capacity(CSV_HEADER.len() + 1 + self.events.len() * 40);
        // Writing into a Vec cannot fail.
        let _ = self.write_csv(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Creates (or truncates) `path` and writes the full history to it.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))?;
        tracing::info!(path = %path.display(), events = self.events.len(), "exported motion log");
        Ok(())
    }

    /// Descriptive statistics over the recorded motion scores, or `None` when
    /// nothing has been recorded.
    pub fn summary(&self) -> Option<HistorySummary> {
        let first = self.events.first()?;
        let last = self.events.last()?;

        let mut scores: Vec<f64> = self.events.iter().map(|e| e.motion_score).collect();
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std_dev = if scores.len() > 1 {
            let sum_sq: f64 = scores.iter().map(|s| (s - mean).powi(2)).sum();
            (sum_sq / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let cutoff = mean + 2.0 * std_dev;
        let motion_events = scores.iter().filter(|&&s| s > cutoff).count();

        let moment = |k: i32| scores.iter().map(|s| (s - mean).powi(k)).sum::<f64>() / n;
        let m2 = moment(2);
        let (skewness, kurtosis) = if m2 > 0.0 {
            (moment(3) / m2.powf(1.5), moment(4) / (m2 * m2) - 3.0)
        } else {
            (0.0, 0.0)
        };

        scores.sort_by(f64::total_cmp);

        Some(HistorySummary {
            mean,
            std_dev,
            median: percentile(&scores, 50.0),
            max: scores[scores.len() - 1],
            p95: percentile(&scores, 95.0),
            skewness,
            kurtosis,
            motion_events,
            total_frames: scores.len(),
            duration_sec: (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0,
        })
    }
}

/// Linear-interpolated percentile of an ascending, non-empty slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Aggregate view of a run's motion scores.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub mean: f64,
    /// Sample standard deviation. Zero for a single event.
    pub std_dev: f64,
    pub median: f64,
    pub max: f64,
    pub p95: f64,
    /// Population skewness. Zero when every score is the same.
    pub skewness: f64,
    /// Excess (Fisher) kurtosis from population moments. Zero when every score
    /// is the same.
    pub kurtosis: f64,
    /// Frames whose score is more than two standard deviations above the mean.
    pub motion_events: usize,
    pub total_frames: usize,
    /// Time between the first and last recorded frame.
    pub duration_sec: f64,
}
