//! Detector configuration.
//!
//! A `DetectorConfig` is immutable: to change a parameter mid-stream, build a
//! new config and push it onto the config channel. Every way of constructing
//! one (the builder, `Default`, JSON deserialization) goes through
//! `DetectorConfigBuilder::build`, which is the single place where invalid
//! values are normalized before they can reach the image-processing code.

use crate::error::ConfigError;
use crate::roi::RoiSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BLUR_KERNEL: u32 = 21;
pub const DEFAULT_THRESHOLD: u8 = 25;
pub const DEFAULT_MIN_CONTOUR_AREA: f64 = 500.0;
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
/// Learning rates at or below zero are raised to this.
pub const MIN_LEARNING_RATE: f64 = 1e-4;
/// Largest blur window accepted; wider kernels are cut down to this.
pub const MAX_BLUR_KERNEL: u32 = 255;

/// Decides whether a new ROI differs enough from the current one to discard
/// the background model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "epsilon", rename_all = "snake_case")]
pub enum RoiResetPolicy {
    /// Any change in any of the four ROI values resets the background.
    #[default]
    ExactMatch,
    /// Only a change larger than the given amount, in any field, resets it.
    Tolerance(f32),
}

impl RoiResetPolicy {
    pub fn roi_changed(&self, current: &RoiSpec, next: &RoiSpec) -> bool {
        let pairs = [
            (current.center_x, next.center_x),
            (current.center_y, next.center_y),
            (current.width_ratio, next.width_ratio),
            (current.height_ratio, next.height_ratio),
        ];
        match *self {
            Self::ExactMatch => pairs.iter().any(|(a, b)| a.to_bits() != b.to_bits()),
            Self::Tolerance(epsilon) => pairs.iter().any(|(a, b)| (a - b).abs() > epsilon),
        }
    }
}

/// Parameters of the motion detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectorConfigBuilder")]
pub struct DetectorConfig {
    roi: RoiSpec,
    blur_kernel: u32,
    threshold: u8,
    min_contour_area: f64,
    learning_rate: f64,
    draw_roi: bool,
    roi_reset_policy: RoiResetPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfigBuilder::default().build()
    }
}

impl DetectorConfig {
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }

    /// A builder pre-filled with this config's values.
    pub fn to_builder(&self) -> DetectorConfigBuilder {
        DetectorConfigBuilder {
            roi: self.roi,
            blur_kernel: self.blur_kernel,
            threshold: self.threshold,
            min_contour_area: self.min_contour_area,
            learning_rate: self.learning_rate,
            draw_roi: self.draw_roi,
            roi_reset_policy: self.roi_reset_policy,
        }
    }

    /// A copy of this config with a different ROI.
    pub fn with_roi(&self, roi: RoiSpec) -> Self {
        self.to_builder().roi(roi).build()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON config file. Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn roi(&self) -> RoiSpec {
        self.roi
    }

    /// Always odd and at least 1.
    pub fn blur_kernel(&self) -> u32 {
        self.blur_kernel
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn min_contour_area(&self) -> f64 {
        self.min_contour_area
    }

    /// Always in `(0, 1]`.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn draw_roi(&self) -> bool {
        self.draw_roi
    }

    pub fn roi_reset_policy(&self) -> RoiResetPolicy {
        self.roi_reset_policy
    }

    /// Whether switching from this config to `next` must discard the
    /// background model. Decided by `next`'s reset policy.
    pub fn requires_reset(&self, next: &DetectorConfig) -> bool {
        next.roi_reset_policy.roi_changed(&self.roi, &next.roi)
    }
}

/// Collects detector parameters; `build` normalizes them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfigBuilder {
    roi: RoiSpec,
    blur_kernel: u32,
    threshold: u8,
    min_contour_area: f64,
    learning_rate: f64,
    draw_roi: bool,
    roi_reset_policy: RoiResetPolicy,
}

impl Default for DetectorConfigBuilder {
    fn default() -> Self {
        Self {
            roi: RoiSpec::default(),
            blur_kernel: DEFAULT_BLUR_KERNEL,
            threshold: DEFAULT_THRESHOLD,
            min_contour_area: DEFAULT_MIN_CONTOUR_AREA,
            learning_rate: DEFAULT_LEARNING_RATE,
            draw_roi: true,
            roi_reset_policy: RoiResetPolicy::default(),
        }
    }
}

impl DetectorConfigBuilder {
    pub fn roi(mut self, roi: RoiSpec) -> Self {
        self.roi = roi;
        self
    }

    pub fn blur_kernel(mut self, blur_kernel: u32) -> Self {
        self.blur_kernel = blur_kernel;
        self
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn min_contour_area(mut self, min_contour_area: f64) -> Self {
        self.min_contour_area = min_contour_area;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn draw_roi(mut self, draw_roi: bool) -> Self {
        self.draw_roi = draw_roi;
        self
    }

    pub fn roi_reset_policy(mut self, policy: RoiResetPolicy) -> Self {
        self.roi_reset_policy = policy;
        self
    }

    pub fn build(self) -> DetectorConfig {
        DetectorConfig {
            roi: self.roi.normalized(),
            blur_kernel: odd_kernel(self.blur_kernel),
            threshold: self.threshold,
            min_contour_area: if self.min_contour_area.is_finite() {
                self.min_contour_area.max(0.0)
            } else {
                DEFAULT_MIN_CONTOUR_AREA
            },
            learning_rate: learning_rate(self.learning_rate),
            draw_roi: self.draw_roi,
            roi_reset_policy: match self.roi_reset_policy {
                RoiResetPolicy::Tolerance(eps) if !eps.is_finite() || eps < 0.0 => {
                    RoiResetPolicy::ExactMatch
                }
                policy => policy,
            },
        }
    }
}

impl From<DetectorConfigBuilder> for DetectorConfig {
    fn from(builder: DetectorConfigBuilder) -> Self {
        builder.build()
    }
}

fn odd_kernel(size: u32) -> u32 {
    let normalized = match size {
        0 => 1,
        n if n > MAX_BLUR_KERNEL => MAX_BLUR_KERNEL,
        n if n % 2 == 0 => n + 1,
        n => n,
    };
    if normalized != size {
        tracing::warn!(
            requested = size,
            used = normalized,
            max = MAX_BLUR_KERNEL,
            "blur kernel must be odd, positive and at most the maximum"
        );
    }
    normalized
}

fn learning_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        tracing::warn!("learning rate is NaN, using default");
        DEFAULT_LEARNING_RATE
    } else {
        rate.clamp(MIN_LEARNING_RATE, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = DetectorConfig::default();
        assert_eq!(config.blur_kernel(), 21);
        assert_eq!(config.threshold(), 25);
        assert_eq!(config.min_contour_area(), 500.0);
        assert_eq!(config.learning_rate(), 0.01);
        assert!(config.draw_roi());
        assert_eq!(config.roi(), RoiSpec::default());
        assert_eq!(config.roi_reset_policy(), RoiResetPolicy::ExactMatch);
    }

    #[test]
    fn even_and_zero_kernels_are_made_odd() {
        assert_eq!(DetectorConfig::builder().blur_kernel(4).build().blur_kernel(), 5);
        assert_eq!(DetectorConfig::builder().blur_kernel(0).build().blur_kernel(), 1);
        assert_eq!(DetectorConfig::builder().blur_kernel(7).build().blur_kernel(), 7);
    }

    #[test]
    fn oversized_kernels_are_capped() {
        let kernel = |k| DetectorConfig::builder().blur_kernel(k).build().blur_kernel();
        assert_eq!(kernel(MAX_BLUR_KERNEL), MAX_BLUR_KERNEL);
        assert_eq!(kernel(MAX_BLUR_KERNEL - 1), MAX_BLUR_KERNEL);
        assert_eq!(kernel(MAX_BLUR_KERNEL + 1), MAX_BLUR_KERNEL);
        assert_eq!(kernel(20_001), MAX_BLUR_KERNEL);

        let config = DetectorConfig::from_json_str(r#"{ "blur_kernel": 4294967295 }"#)
            .expect("valid config json");
        assert_eq!(config.blur_kernel(), MAX_BLUR_KERNEL);
    }

    #[test]
    fn learning_rate_is_kept_in_range() {
        let rate = |r| DetectorConfig::builder().learning_rate(r).build().learning_rate();
        assert_eq!(rate(0.0), MIN_LEARNING_RATE);
        assert_eq!(rate(-2.0), MIN_LEARNING_RATE);
        assert_eq!(rate(4.0), 1.0);
        assert_eq!(rate(f64::NAN), DEFAULT_LEARNING_RATE);
        assert_eq!(rate(0.25), 0.25);
    }

    #[test]
    fn only_roi_changes_require_a_reset() {
        let current = DetectorConfig::default();
        let retuned = current.to_builder().threshold(60).min_contour_area(10.0).build();
        assert!(!current.requires_reset(&retuned));

        let moved = current.with_roi(RoiSpec::new(0.4, 0.6, 0.3, 0.8));
        assert!(current.requires_reset(&moved));
    }

    #[test]
    fn tolerance_policy_ignores_small_roi_jitter() {
        let current = DetectorConfig::default();
        let jittered = current
            .to_builder()
            .roi(RoiSpec::new(0.5001, 0.6, 0.3, 0.8))
            .roi_reset_policy(RoiResetPolicy::Tolerance(0.001))
            .build();
        assert!(!current.requires_reset(&jittered));

        let exact = jittered.to_builder().roi_reset_policy(RoiResetPolicy::ExactMatch).build();
        assert!(current.requires_reset(&exact));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults_and_normalizes() {
        let json = r#"{
            "blur_kernel": 8,
            "threshold": 40,
            "roi": { "center_x": 0.25, "width_ratio": 0.01 },
            "roi_reset_policy": { "mode": "tolerance", "epsilon": 0.01 }
        }"#;
        let config = DetectorConfig::from_json_str(json).expect("valid config json");
        assert_eq!(config.blur_kernel(), 9);
        assert_eq!(config.threshold(), 40);
        assert_eq!(config.min_contour_area(), DEFAULT_MIN_CONTOUR_AREA);
        assert_eq!(config.roi().center_x, 0.25);
        assert_eq!(config.roi().center_y, 0.6);
        assert_eq!(config.roi().width_ratio, crate::roi::MIN_ROI_RATIO);
        assert_eq!(config.roi_reset_policy(), RoiResetPolicy::Tolerance(0.01));
    }

    #[test]
    fn serialized_config_loads_back_unchanged() {
        let config = DetectorConfig::builder().threshold(12).draw_roi(false).build();
        let json = serde_json::to_string(&config).expect("config serializes");
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("detector.json");
        std::fs::write(&path, json).expect("write config");

        assert_eq!(DetectorConfig::load(&path).expect("load config"), config);
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = DetectorConfig::from_json_str("{ not json").expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
