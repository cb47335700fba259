// THEORY:
// `core_modules` holds every per-pixel and per-blob algorithm, one component per
// file, listed here leaves first. None of them know about frame sources, sinks,
// timing or configuration files; `pipeline` wires them together.

pub mod pixel;
pub mod color_model;
pub mod patch;
pub mod background;
pub mod classifier;
pub mod blob;
pub mod blob_detector;
pub mod blob_merger;
pub mod shape;
pub mod identity;
pub mod tracker;
pub mod motion_filter;
pub mod utils;
