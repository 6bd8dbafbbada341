// THEORY:
// The runner is the process boundary around the `roi_vision` pipeline. The
// library owns the capture and detection threads; this binary owns everything
// that only makes sense once per process: argument parsing, logging setup, the
// Ctrl-C handler, and the final export.
//
// The tokio runtime plays the part of the external consumer. A single task
// multiplexes three timers with `select!`: polling the result channel, saving a
// snapshot of the latest visualization, and watching the config file for edits.
// Shutdown always runs in the same order (detection, then capture, then export)
// so the exported log contains every event the detector recorded.

mod backend;
mod cli;
mod config_watch;
mod pipeline;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use config_watch::ConfigWatcher;
use pipeline::Pipeline;
use roi_vision::{DetectionResult, DetectorConfig, OverlayFont};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "roi_vision=info,roi_vision_runner=info";
const CONFIG_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!(source = %args.source, output = %args.output.display(), "starting roi_vision {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    let font = args
        .font
        .as_ref()
        .map(|path| {
            OverlayFont::from_path(path)
                .with_context(|| format!("failed to load font {}", path.display()))
        })
        .transpose()?;
    if font.is_none() {
        tracing::info!("no --font given, visualizations carry no text overlay");
    }

    let backend = backend::for_descriptor(&args.source)?;
    let pipeline = Pipeline::start(
        &args.source,
        backend,
        args.source_settings(),
        args.queue_capacity,
        config,
        font,
    )?;

    let consumed = consume(&args, &pipeline).await;

    let detector = pipeline.shutdown()?;
    consumed?;
    detector
        .export_csv(&args.output)
        .with_context(|| format!("failed to export {}", args.output.display()))?;

    match detector.history().summary() {
        Some(summary) => tracing::info!(
            frames = summary.total_frames,
            duration_sec = summary.duration_sec,
            mean = summary.mean,
            std_dev = summary.std_dev,
            median = summary.median,
            max = summary.max,
            p95 = summary.p95,
            skewness = summary.skewness,
            kurtosis = summary.kurtosis,
            motion_events = summary.motion_events,
            "motion summary"
        ),
        None => tracing::info!("no frames were processed"),
    }
    Ok(())
}

/// Plays the consumer until Ctrl-C, or until a non-looping source runs dry.
async fn consume(args: &Args, pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut poll = tokio::time::interval(Duration::from_millis(args.poll_ms.max(1)));
    let mut snapshot_timer = tokio::time::interval(SNAPSHOT_INTERVAL);
    let mut config_timer = tokio::time::interval(CONFIG_POLL_INTERVAL);
    let mut watcher = match &args.config {
        Some(path) => Some(ConfigWatcher::new(path.clone()).await),
        None => None,
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut latest: Option<DetectionResult> = None;
    let mut saved_frame: Option<u64> = None;
    let mut moving = false;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("interrupt received, shutting down");
                return Ok(());
            }
            _ = poll.tick() => {
                if let Some(result) = pipeline.results().try_pop_latest() {
                    let event = &result.event;
                    if event.has_motion() != moving {
                        moving = event.has_motion();
                        tracing::info!(
                            frame_id = event.frame_id,
                            motion_score = event.motion_score,
                            contour_count = event.contour_count,
                            "{}",
                            if moving { "motion started" } else { "motion ended" }
                        );
                    }
                    latest = Some(result);
                }
                if pipeline.is_drained() {
                    tracing::info!("source finished");
                    return Ok(());
                }
            }
            _ = snapshot_timer.tick(), if args.snapshot.is_some() => {
                if let (Some(path), Some(result)) = (&args.snapshot, &latest) {
                    if saved_frame != Some(result.event.frame_id) {
                        saved_frame = Some(result.event.frame_id);
                        save_snapshot(path.clone(), result).await;
                    }
                }
            }
            _ = config_timer.tick(), if watcher.is_some() => {
                if let Some(watcher) = watcher.as_mut() {
                    if let Some(config) = watcher.poll().await {
                        pipeline.configs().push(config);
                    }
                }
            }
        }
    }
}

async fn save_snapshot(path: PathBuf, result: &DetectionResult) {
    let image = result.visualization.clone();
    let saved = tokio::task::spawn_blocking(move || image.save(&path).map(|()| path)).await;
    match saved {
        Ok(Ok(path)) => tracing::debug!(path = %path.display(), "snapshot saved"),
        Ok(Err(err)) => tracing::warn!(%err, "failed to save snapshot"),
        Err(err) => tracing::warn!(%err, "snapshot task failed"),
    }
}
