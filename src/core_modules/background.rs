// THEORY:
// The `BackgroundEstimator` learns what the empty scene looks like. It is the only
// component whose work spans several ticks: once triggered it copies every tick's
// per-pixel `ColorSample`s into a buffer until it holds `required` frames, then
// reduces them to one reference colour per pixel, the `BackgroundModel`.
//
// Reduction per pixel:
// - chroma and intensity: the median of the collected values (sorted, middle
//   element at index (N - 1) / 2), which ignores a hand briefly passing through.
// - hue: the circular mean. Each hue is placed on the unit circle and the vectors
//   are summed; `atan2` of the sum is the mean direction. If the sum is exactly
//   zero there is no mean, and the most recent frame's hue is used instead.
//
// State machine: Idle -> Armed(at) -> Capturing -> (compute) -> Idle.
// There is no timeout. A stalled frame source leaves capture pending forever.

use crate::core_modules::color_model::{ColorSample, HUE_DOMAIN};
use std::f64::consts::TAU;
use std::time::Instant;
use tracing::{debug, info};

/// One reference colour per pixel, immutable once computed.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    samples: Vec<ColorSample>,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, samples: Vec<ColorSample>) -> Self {
        debug_assert_eq!(samples.len(), (width * height) as usize);
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[ColorSample] {
        &self.samples
    }

    pub fn matches_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Armed { at: Instant },
    Capturing,
}

/// What a tick's observation did to the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProgress {
    /// No capture in progress; the frame should be classified normally.
    Idle,
    /// Capture is scheduled but has not started yet.
    Armed,
    /// The frame was stored; classification is unavailable this tick.
    Collecting { collected: usize, required: usize },
    /// The final frame was stored and a new model is ready.
    Completed,
}

pub struct BackgroundEstimator {
    required: usize,
    state: CaptureState,
    frames: Vec<Vec<ColorSample>>,
    model: Option<BackgroundModel>,
}

impl BackgroundEstimator {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            state: CaptureState::Idle,
            frames: Vec::new(),
            model: None,
        }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// Takes effect at the next capture; a capture in progress keeps its target.
    pub fn set_required(&mut self, required: usize) {
        self.required = required.max(1);
    }

    /// Schedules a capture to begin with the first tick at or after `at`.
    pub fn arm(&mut self, at: Instant) {
        self.frames.clear();
        self.state = CaptureState::Armed { at };
    }

    /// Starts collecting with the very next observed frame.
    pub fn begin(&mut self) {
        self.frames.clear();
        self.state = CaptureState::Capturing;
    }

    pub fn cancel(&mut self) {
        self.frames.clear();
        self.state = CaptureState::Idle;
    }

    pub fn is_idle(&self) -> bool {
        self.state == CaptureState::Idle
    }

    pub fn model(&self) -> Option<&BackgroundModel> {
        self.model.as_ref()
    }

    pub fn clear_model(&mut self) {
        self.model = None;
    }

    /// Feeds one tick's samples into the state machine.
    pub fn observe(
        &mut self,
        samples: &[ColorSample],
        width: u32,
        height: u32,
        now: Instant,
    ) -> CaptureProgress {
        if let CaptureState::Armed { at } = self.state {
            if now < at {
                return CaptureProgress::Armed;
            }
            debug!(required = self.required, "background capture started");
            self.state = CaptureState::Capturing;
        }
        if self.state != CaptureState::Capturing {
            return CaptureProgress::Idle;
        }

        self.frames.push(samples.to_vec());
        if self.frames.len() < self.required {
            return CaptureProgress::Collecting {
                collected: self.frames.len(),
                required: self.required,
            };
        }

        let frames = std::mem::take(&mut self.frames);
        self.model = Some(compute_model(&frames, width, height));
        self.state = CaptureState::Idle;
        info!(frames = frames.len(), width, height, "background model computed");
        CaptureProgress::Completed
    }
}

fn compute_model(frames: &[Vec<ColorSample>], width: u32, height: u32) -> BackgroundModel {
    let num_pixels = (width * height) as usize;
    let mut chroma_values = Vec::with_capacity(frames.len());
    let mut intensity_values = Vec::with_capacity(frames.len());
    let mut samples = Vec::with_capacity(num_pixels);

    for index in 0..num_pixels {
        chroma_values.clear();
        intensity_values.clear();
        for frame in frames {
            chroma_values.push(frame[index].chroma);
            intensity_values.push(frame[index].intensity);
        }

        let (total_x, total_y) = hue_vector(frames.iter().map(|frame| frame[index].hue));
        let latest = frames.last().map_or(0.0, |frame| frame[index].hue);
        let hue = background_hue(total_x, total_y, latest);

        samples.push(ColorSample::new(
            hue,
            median(&mut chroma_values),
            median(&mut intensity_values),
        ));
    }

    BackgroundModel::new(width, height, samples)
}

/// Middle element of the sorted values, at index (N - 1) / 2.
pub fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    values[(values.len() - 1) / 2]
}

/// Sum of the unit vectors of `hues` placed on the `HUE_DOMAIN` circle.
pub fn hue_vector(hues: impl Iterator<Item = f32>) -> (f64, f64) {
    let circle_fraction = TAU / HUE_DOMAIN as f64;
    hues.fold((0.0, 0.0), |(total_x, total_y), hue| {
        let angle = hue as f64 * circle_fraction;
        (total_x + angle.cos(), total_y + angle.sin())
    })
}

/// Direction of a summed hue vector, or `None` if it is exactly zero.
pub fn vector_hue(total_x: f64, total_y: f64) -> Option<f32> {
    if total_x == 0.0 && total_y == 0.0 {
        return None;
    }
    let mut angle = total_y.atan2(total_x);
    if angle < 0.0 {
        angle += TAU;
    }
    let hue = (angle / (TAU / HUE_DOMAIN as f64)) as f32;
    Some(if hue >= HUE_DOMAIN { 0.0 } else { hue })
}

/// Mean direction of hues on the `HUE_DOMAIN` circle, or `None` if the summed
/// vector is exactly zero.
pub fn circular_mean_hue(hues: impl Iterator<Item = f32>) -> Option<f32> {
    let (total_x, total_y) = hue_vector(hues);
    vector_hue(total_x, total_y)
}

/// Background hue of one pixel: the mean direction, or the most recent frame's
/// hue when the collected hues cancel out.
fn background_hue(total_x: f64, total_y: f64, latest: f32) -> f32 {
    vector_hue(total_x, total_y).unwrap_or(latest)
}
