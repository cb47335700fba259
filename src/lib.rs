// THEORY:
// This file is the entry point for the `chroma_vision` library crate. It exposes
// `VisionPipeline` and its associated data structures (`TrackerConfig`,
// `Report`, `BlobReport`, ...) as the high-level interface of the tracking
// engine. The per-pixel and per-blob algorithms live in `core_modules`; frame
// acquisition (`source`), presentation (`render`) and the refresh loop
// (`runner`) sit around the pipeline as separate seams.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod runner;
pub mod source;

pub use config::{DisplayMode, KeyColor, TrackerConfig};
pub use error::{ConfigError, SinkError, SourceError, VisionError};
pub use pipeline::{BlobReport, Report, VisionPipeline};
pub use render::{PngSequenceSink, Renderer, Sink};
pub use runner::{RunSummary, run};
pub use source::{Frame, FrameSource, ImageSequenceSource, MemorySource, SourceInfo};
