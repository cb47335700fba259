// THEORY:
// Errors are split by the boundary they cross. Configuration values are rejected
// where they enter (`ConfigError`), frame acquisition failures are reported by the
// source (`SourceError`), and output failures by the sink (`SinkError`). The
// pipeline's own failures, plus the three above, are folded into `VisionError`
// so callers driving a whole session only have one type to match on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rejected value for `{field}`: {reason}")]
    Rejected { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn rejected(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied by frame source: {0}")]
    PermissionDenied(String),
    #[error("frame source has no frames")]
    Empty,
    #[error("frame {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    InconsistentSize {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write output frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("frame is {width}x{height}, session was started at {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("pipeline is not running")]
    NotRunning,
    #[error("sample patch at ({x}, {y}) lies outside the frame")]
    EmptySamplePatch { x: u32, y: u32 },
}
