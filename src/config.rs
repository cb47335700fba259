// THEORY:
// `TrackerConfig` is every tunable of a tracking session in one place. It is read
// from a TOML file (`TrackerConfig::load`) where every field is optional and falls
// back to its `default_*` function, so a config only needs to name what it changes.
//
// Values can also be changed while a session runs, the way the on-screen sliders
// of a live tracker would change them. Every such change goes through a `set_*`
// method that validates the new value first: an invalid value is rejected with a
// `ConfigError::Rejected`, logged, and the previous value stays in place. Nothing
// invalid ever reaches the pipeline.

use crate::core_modules::color_model::{ChannelThresholds, MagnitudeFormula};
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// What a tick produces for the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// The camera image, untouched. Nothing is classified.
    Camera,
    /// Pixels matching the learned background painted in the key colour.
    BackgroundSubtraction,
    /// Pixels matching the target colour (and not the background) painted in
    /// the key colour.
    ColorKey,
    /// Tracked blobs with their hulls, centroids and IDs.
    #[default]
    Blobs,
    /// The filtered motion mask.
    MotionTracker,
}

/// An opaque RGB colour written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct KeyColor(pub [u8; 3]);

impl KeyColor {
    pub fn rgba(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], 255]
    }
}

impl FromStr for KeyColor {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::rejected("display.key_color", format!("`{text}` is not a #rrggbb colour"));
        let hex = text.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).map_err(|_| invalid());
        Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
    }
}

impl TryFrom<String> for KeyColor {
    type Error = ConfigError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl fmt::Display for KeyColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorConfig {
    #[serde(default)]
    pub formula: MagnitudeFormula,
    /// Initial target colour as RGB; replaced by `pick_target_color`.
    #[serde(default = "default_target_rgb")]
    pub target_rgb: [u8; 3],
    #[serde(default = "default_foreground_thresholds")]
    pub foreground: ChannelThresholds,
    #[serde(default = "default_background_thresholds")]
    pub background: ChannelThresholds,
    /// Half-size of the square averaged when picking a target colour.
    #[serde(default = "default_sample_radius")]
    pub sample_radius: u32,
    /// Worker threads for classification; 0 means one per CPU.
    #[serde(default)]
    pub classification_workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    #[serde(default = "default_blob_distance")]
    pub distance_x: i32,
    #[serde(default = "default_blob_distance")]
    pub distance_y: i32,
    #[serde(default = "default_boundary_fraction")]
    pub boundary_fraction: f64,
    #[serde(default = "default_min_points")]
    pub min_points: u32,
    /// Keep blobs built by a merge even when they are under `min_points`.
    #[serde(default)]
    pub keep_merged: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u32,
    /// IDs `[0, reserved_ids)` only go to blobs reaching far enough right.
    #[serde(default)]
    pub reserved_ids: u32,
    #[serde(default = "default_reserved_min_right_fraction")]
    pub reserved_min_right_fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    #[serde(default = "default_motion_threshold")]
    pub threshold: f32,
    #[serde(default)]
    pub hue_weight: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundConfig {
    /// Classify pixels matching the learned background as background.
    #[serde(default)]
    pub subtract: bool,
    #[serde(default = "default_background_sample_count")]
    pub sample_count: usize,
    #[serde(default = "default_capture_delay_ms")]
    pub capture_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub mode: DisplayMode,
    #[serde(default = "default_key_color")]
    pub key_color: KeyColor,
    /// Report x coordinates mirrored, as a user facing the camera sees them.
    #[serde(default = "default_mirror_output")]
    pub mirror_output: bool,
    /// How often the embedding loop polls for a new frame.
    #[serde(default = "default_refresh_rate_hz")]
    pub refresh_rate_hz: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// --- Defaults ---

fn default_target_rgb() -> [u8; 3] {
    [200, 30, 30]
}
fn default_foreground_thresholds() -> ChannelThresholds {
    ChannelThresholds::new(2048.0, 16384.0, 120.0)
}
fn default_background_thresholds() -> ChannelThresholds {
    ChannelThresholds::new(1024.0, 8192.0, 40.0)
}
fn default_sample_radius() -> u32 {
    5
}
fn default_blob_distance() -> i32 {
    10
}
fn default_boundary_fraction() -> f64 {
    0.95
}
fn default_min_points() -> u32 {
    200
}
fn default_max_ttl() -> u32 {
    5
}
fn default_reserved_min_right_fraction() -> f64 {
    0.66
}
fn default_motion_threshold() -> f32 {
    30.0
}
fn default_background_sample_count() -> usize {
    51
}
fn default_capture_delay_ms() -> u64 {
    3000
}
fn default_key_color() -> KeyColor {
    KeyColor([0, 255, 0])
}
fn default_mirror_output() -> bool {
    true
}
fn default_refresh_rate_hz() -> f64 {
    60.0
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            formula: MagnitudeFormula::default(),
            target_rgb: default_target_rgb(),
            foreground: default_foreground_thresholds(),
            background: default_background_thresholds(),
            sample_radius: default_sample_radius(),
            classification_workers: 0,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            distance_x: default_blob_distance(),
            distance_y: default_blob_distance(),
            boundary_fraction: default_boundary_fraction(),
            min_points: default_min_points(),
            keep_merged: false,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_ttl: default_max_ttl(),
            reserved_ids: 0,
            reserved_min_right_fraction: default_reserved_min_right_fraction(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold: default_motion_threshold(),
            hue_weight: 0.0,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            subtract: false,
            sample_count: default_background_sample_count(),
            capture_delay_ms: default_capture_delay_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::default(),
            key_color: default_key_color(),
            mirror_output: default_mirror_output(),
            refresh_rate_hz: default_refresh_rate_hz(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// --- Checks ---

fn require(field: &'static str, valid: bool, reason: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if valid {
        Ok(())
    } else {
        let error = ConfigError::rejected(field, reason());
        warn!(%error, "configuration value rejected");
        Err(error)
    }
}

fn check_gap(field: &'static str, value: i32) -> Result<(), ConfigError> {
    require(field, value > 0, || format!("gap tolerance must be positive, got {value}"))
}

fn check_boundary_fraction(value: f64) -> Result<(), ConfigError> {
    require("blobs.boundary_fraction", (0.5..=1.0).contains(&value), || {
        format!("must lie in [0.5, 1.0], got {value}")
    })
}

fn check_min_points(value: u32) -> Result<(), ConfigError> {
    require("blobs.min_points", value > 0, || "must be positive".into())
}

fn check_max_ttl(value: u32) -> Result<(), ConfigError> {
    require("tracking.max_ttl", value > 0, || "must be positive".into())
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    require(field, (0.0..=1.0).contains(&value), || format!("must lie in [0, 1], got {value}"))
}

fn check_motion_threshold(value: f32) -> Result<(), ConfigError> {
    require("motion.threshold", value.is_finite() && value > 0.0, || {
        format!("must be positive, got {value}")
    })
}

fn check_hue_weight(value: f32) -> Result<(), ConfigError> {
    require("motion.hue_weight", value.is_finite() && value >= 0.0, || {
        format!("must not be negative, got {value}")
    })
}

fn check_sample_count(value: usize) -> Result<(), ConfigError> {
    require("background.sample_count", value > 0, || "must be positive".into())
}

fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    require(field, value.is_finite() && value > 0.0, || format!("must be positive, got {value}"))
}

fn check_thresholds(field: &'static str, value: &ChannelThresholds) -> Result<(), ConfigError> {
    let valid = [value.hue, value.chroma, value.intensity]
        .iter()
        .all(|component| component.is_finite() && *component >= 0.0);
    require(field, valid, || format!("every threshold must be a non-negative number, got {value:?}"))
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TrackerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value; the first invalid one is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_thresholds("color.foreground", &self.color.foreground)?;
        check_thresholds("color.background", &self.color.background)?;
        check_gap("blobs.distance_x", self.blobs.distance_x)?;
        check_gap("blobs.distance_y", self.blobs.distance_y)?;
        check_boundary_fraction(self.blobs.boundary_fraction)?;
        check_min_points(self.blobs.min_points)?;
        check_max_ttl(self.tracking.max_ttl)?;
        check_fraction("tracking.reserved_min_right_fraction", self.tracking.reserved_min_right_fraction)?;
        check_motion_threshold(self.motion.threshold)?;
        check_hue_weight(self.motion.hue_weight)?;
        check_sample_count(self.background.sample_count)?;
        check_rate("display.refresh_rate_hz", self.display.refresh_rate_hz)?;
        Ok(())
    }

    pub fn set_foreground_thresholds(&mut self, value: ChannelThresholds) -> Result<(), ConfigError> {
        check_thresholds("color.foreground", &value)?;
        self.color.foreground = value;
        Ok(())
    }

    pub fn set_background_thresholds(&mut self, value: ChannelThresholds) -> Result<(), ConfigError> {
        check_thresholds("color.background", &value)?;
        self.color.background = value;
        Ok(())
    }

    pub fn set_blob_distance_x(&mut self, value: i32) -> Result<(), ConfigError> {
        check_gap("blobs.distance_x", value)?;
        self.blobs.distance_x = value;
        Ok(())
    }

    pub fn set_blob_distance_y(&mut self, value: i32) -> Result<(), ConfigError> {
        check_gap("blobs.distance_y", value)?;
        self.blobs.distance_y = value;
        Ok(())
    }

    pub fn set_boundary_fraction(&mut self, value: f64) -> Result<(), ConfigError> {
        check_boundary_fraction(value)?;
        self.blobs.boundary_fraction = value;
        Ok(())
    }

    pub fn set_min_blob_points(&mut self, value: u32) -> Result<(), ConfigError> {
        check_min_points(value)?;
        self.blobs.min_points = value;
        Ok(())
    }

    pub fn set_max_ttl(&mut self, value: u32) -> Result<(), ConfigError> {
        check_max_ttl(value)?;
        self.tracking.max_ttl = value;
        Ok(())
    }

    pub fn set_motion_threshold(&mut self, value: f32) -> Result<(), ConfigError> {
        check_motion_threshold(value)?;
        self.motion.threshold = value;
        Ok(())
    }

    pub fn set_hue_motion_weight(&mut self, value: f32) -> Result<(), ConfigError> {
        check_hue_weight(value)?;
        self.motion.hue_weight = value;
        Ok(())
    }

    pub fn set_background_sample_count(&mut self, value: usize) -> Result<(), ConfigError> {
        check_sample_count(value)?;
        self.background.sample_count = value;
        Ok(())
    }

    pub fn set_refresh_rate_hz(&mut self, value: f64) -> Result<(), ConfigError> {
        check_rate("display.refresh_rate_hz", value)?;
        self.display.refresh_rate_hz = value;
        Ok(())
    }

    pub fn set_key_color(&mut self, value: &str) -> Result<(), ConfigError> {
        let color = value.parse::<KeyColor>().inspect_err(|error| warn!(%error, "configuration value rejected"))?;
        self.display.key_color = color;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: TrackerConfig = toml::from_str("").unwrap();
        assert_eq!(config.blobs.distance_x, 10);
        assert_eq!(config.background.sample_count, 51);
        assert_eq!(config.background.capture_delay_ms, 3000);
        assert_eq!(config.tracking.reserved_ids, 0);
        assert_eq!(config.display.mode, DisplayMode::Blobs);
        assert!(config.display.mirror_output);
        assert!(!config.blobs.keep_merged);
        assert_eq!(config.color.formula, MagnitudeFormula::Saturation);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_override_single_fields() {
        let config: TrackerConfig = toml::from_str(
            r##"
            [color]
            formula = "lightness"
            foreground = { hue = 1000.0, chroma = 40.0, intensity = 30.0 }

            [blobs]
            distance_y = 4
            keep_merged = true

            [display]
            mode = "motion_tracker"
            key_color = "#ff8000"
            "##,
        )
        .unwrap();
        assert_eq!(config.color.formula, MagnitudeFormula::Lightness);
        assert_eq!(config.color.foreground, ChannelThresholds::new(1000.0, 40.0, 30.0));
        assert_eq!(config.blobs.distance_x, 10);
        assert_eq!(config.blobs.distance_y, 4);
        assert!(config.blobs.keep_merged);
        assert_eq!(config.display.mode, DisplayMode::MotionTracker);
        assert_eq!(config.display.key_color, KeyColor([255, 128, 0]));
    }

    #[test]
    fn bad_key_color_fails_to_parse() {
        let result: Result<TrackerConfig, _> = toml::from_str("[display]\nkey_color = \"green\"");
        assert!(result.is_err());
    }

    #[test]
    fn key_color_round_trips_through_text() {
        let color: KeyColor = "#0A1b2C".parse().unwrap();
        assert_eq!(color, KeyColor([10, 27, 44]));
        assert_eq!(color.to_string(), "#0a1b2c");
        assert!("0a1b2c".parse::<KeyColor>().is_err());
        assert!("#0a1b2".parse::<KeyColor>().is_err());
        assert!("#0a1b2g".parse::<KeyColor>().is_err());
    }

    #[test]
    fn rejected_values_keep_the_previous_one() {
        let mut config = TrackerConfig::default();
        assert!(config.set_blob_distance_x(0).is_err());
        assert_eq!(config.blobs.distance_x, 10);
        assert!(config.set_boundary_fraction(0.4).is_err());
        assert!(config.set_boundary_fraction(1.01).is_err());
        assert_eq!(config.blobs.boundary_fraction, 0.95);
        assert!(config.set_max_ttl(0).is_err());
        assert!(config.set_motion_threshold(-1.0).is_err());
        assert!(config.set_key_color("#12").is_err());
        assert_eq!(config.display.key_color, KeyColor([0, 255, 0]));

        config.set_boundary_fraction(0.5).unwrap();
        config.set_blob_distance_y(3).unwrap();
        config.set_key_color("#102030").unwrap();
        assert_eq!(config.blobs.boundary_fraction, 0.5);
        assert_eq!(config.blobs.distance_y, 3);
        assert_eq!(config.display.key_color, KeyColor([16, 32, 48]));
    }

    #[test]
    fn rejection_names_the_field() {
        let mut config = TrackerConfig::default();
        match config.set_min_blob_points(0) {
            Err(ConfigError::Rejected { field, .. }) => assert_eq!(field, "blobs.min_points"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn load_validates_the_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("chroma_vision_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[blobs]\nboundary_fraction = 0.2\n").unwrap();
        let result = TrackerConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Rejected { .. })));

        let missing = TrackerConfig::load(&dir.join("chroma_vision_missing.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }
}
