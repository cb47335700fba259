// THEORY:
// The `pipeline` module is the top-level API of the tracking engine. A
// `VisionPipeline` owns every stage and the state that spans ticks (the previous
// frame, the background model, the tracked blobs and their IDs). The embedding
// application drives it explicitly:
//
// 1.  `start(source)` negotiates frame size and rate with the source. Failure
//     leaves the pipeline stopped.
// 2.  `tick(frame, now)` once per available frame. A tick arriving sooner than
//     one frame interval after the last processed tick is skipped (`Ok(None)`),
//     never queued.
// 3.  `stop()` ends the session. Nothing is interrupted: a tick always runs to
//     completion before the next one starts.
//
// One processed tick, in order:
//   sample    every pixel -> ColorSample (banded over worker threads)
//   capture   feed the background estimator; while it is collecting, report
//             progress and stop here
//   classify  foreground / background / motion flags per pixel; background
//             flags need subtraction enabled or the BackgroundSubtraction mode
//   display   depending on the `DisplayMode`: paint an overlay, filter the
//             motion mask, or extract -> merge -> measure -> track blobs
//
// Extraction, merging and identity allocation run on the calling thread only.

use crate::config::{DisplayMode, TrackerConfig};
use crate::core_modules::background::{BackgroundEstimator, BackgroundModel, CaptureProgress};
use crate::core_modules::blob::{Blob, Point};
use crate::core_modules::blob_detector::{BlobExtractor, ExtractionSettings};
use crate::core_modules::blob_merger::{BlobMerger, MergeSettings};
use crate::core_modules::classifier::{ClassificationMask, ClassifierSettings, MaskFlags, PixelClassifier, sample_frame};
use crate::core_modules::color_model::{ChannelThresholds, ColorModel, ColorSample, MagnitudeFormula};
use crate::core_modules::identity::RightExtentFraction;
use crate::core_modules::motion_filter::MotionMaskFilter;
use crate::core_modules::patch::patch::Patch;
use crate::core_modules::pixel::pixel::CHANNELS;
use crate::core_modules::shape::ShapeAnalyzer;
use crate::core_modules::tracker::IdentityTracker;
use crate::error::{ConfigError, VisionError};
use crate::source::{Frame, FrameSource, SourceInfo};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// What the sink receives for one blob.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobReport {
    pub id: Option<u32>,
    /// Display-space centroid.
    pub centroid: (f64, f64),
    /// Display-space convex hull, counter-clockwise.
    pub hull: Vec<Point>,
    pub num_points: u32,
    /// Not seen this tick; geometry is from the last sighting.
    pub ghost: bool,
}

impl BlobReport {
    fn from_blob(blob: &Blob, ghost: bool) -> Self {
        Self {
            id: blob.id(),
            centroid: blob.centroid(),
            hull: blob.hull().to_vec(),
            num_points: blob.num_points(),
            ghost,
        }
    }
}

/// The output of one processed tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// `DisplayMode::Camera`: nothing was classified.
    Passthrough,
    /// Background capture is collecting frames; nothing was classified.
    CapturingBackground { collected: usize, required: usize },
    /// The frame with matched pixels painted in the key colour.
    Overlay(Frame),
    /// Filtered motion alpha, one byte per pixel: 0 moving, 255 still.
    MotionMask(Vec<u8>),
    /// Live blobs first, then ghosts.
    Blobs(Vec<BlobReport>),
}

#[derive(Debug, Clone, Copy)]
struct Session {
    info: SourceInfo,
    frame_interval: Duration,
    last_tick: Option<Instant>,
}

impl Session {
    fn is_due(&self, now: Instant) -> bool {
        self.last_tick
            .is_none_or(|last| now.saturating_duration_since(last) >= self.frame_interval)
    }
}

pub struct VisionPipeline {
    config: TrackerConfig,
    color_model: ColorModel,
    target: ColorSample,
    session: Option<Session>,
    samples: Vec<ColorSample>,
    mask: ClassificationMask,
    classifier: PixelClassifier,
    background: BackgroundEstimator,
    extractor: BlobExtractor,
    merger: BlobMerger,
    tracker: IdentityTracker,
    motion_filter: MotionMaskFilter,
    retired: Vec<Blob>,
}

impl VisionPipeline {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let color_model = ColorModel::new(config.color.formula);
        let [red, green, blue] = config.color.target_rgb;
        let workers = match config.color.classification_workers {
            0 => num_cpus::get(),
            workers => workers,
        };
        let tracker = IdentityTracker::new(
            config.tracking.reserved_ids,
            Box::new(RightExtentFraction(config.tracking.reserved_min_right_fraction)),
        );

        Ok(Self {
            target: color_model.sample_rgb(red, green, blue),
            color_model,
            session: None,
            samples: Vec::new(),
            mask: ClassificationMask::default(),
            classifier: PixelClassifier::new(workers),
            background: BackgroundEstimator::new(config.background.sample_count),
            extractor: BlobExtractor::new(),
            merger: BlobMerger::new(),
            tracker,
            motion_filter: MotionMaskFilter::new(),
            retired: Vec::new(),
            config,
        })
    }

    // --- Session ---

    pub fn start(&mut self, source: &mut dyn FrameSource) -> Result<SourceInfo, VisionError> {
        let info = source.negotiate()?;
        if !(info.frame_rate.is_finite() && info.frame_rate > 0.0) {
            return Err(ConfigError::rejected("source.frame_rate", format!("must be positive, got {}", info.frame_rate)).into());
        }

        if let Some(model) = self.background.model() {
            if !model.matches_size(info.width, info.height) {
                debug!("background model dropped, frame size changed");
                self.background.clear_model();
            }
        }
        self.classifier.reset();
        self.motion_filter.clear();
        let tracked = self.tracker.reset();
        self.extractor.recycle(tracked);

        self.session = Some(Session {
            info,
            frame_interval: Duration::from_secs_f64(1.0 / info.frame_rate),
            last_tick: None,
        });
        info!(
            width = info.width,
            height = info.height,
            frame_rate = info.frame_rate,
            workers = self.classifier.workers(),
            "pipeline started"
        );
        Ok(info)
    }

    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            self.background.cancel();
            info!("pipeline stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn source_info(&self) -> Option<SourceInfo> {
        self.session.map(|session| session.info)
    }

    /// Whether a tick at `now` would be processed rather than skipped.
    pub fn is_due(&self, now: Instant) -> bool {
        self.session.is_some_and(|session| session.is_due(now))
    }

    // --- Configuration ---

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // Tunables are changed through the validated setters below; a rejected
    // value leaves the previous one in place. Changes take effect on the next
    // tick.

    pub fn set_foreground_thresholds(&mut self, value: ChannelThresholds) -> Result<(), ConfigError> {
        self.config.set_foreground_thresholds(value)
    }

    pub fn set_background_thresholds(&mut self, value: ChannelThresholds) -> Result<(), ConfigError> {
        self.config.set_background_thresholds(value)
    }

    pub fn set_blob_distance_x(&mut self, value: i32) -> Result<(), ConfigError> {
        self.config.set_blob_distance_x(value)
    }

    pub fn set_blob_distance_y(&mut self, value: i32) -> Result<(), ConfigError> {
        self.config.set_blob_distance_y(value)
    }

    pub fn set_boundary_fraction(&mut self, value: f64) -> Result<(), ConfigError> {
        self.config.set_boundary_fraction(value)
    }

    pub fn set_min_blob_points(&mut self, value: u32) -> Result<(), ConfigError> {
        self.config.set_min_blob_points(value)
    }

    pub fn set_keep_merged_blobs(&mut self, keep: bool) {
        self.config.blobs.keep_merged = keep;
    }

    /// Applies to blobs created from the next tick on.
    pub fn set_max_ttl(&mut self, value: u32) -> Result<(), ConfigError> {
        self.config.set_max_ttl(value)
    }

    pub fn set_motion_threshold(&mut self, value: f32) -> Result<(), ConfigError> {
        self.config.set_motion_threshold(value)
    }

    pub fn set_hue_motion_weight(&mut self, value: f32) -> Result<(), ConfigError> {
        self.config.set_hue_motion_weight(value)
    }

    /// Applies to the next requested capture.
    pub fn set_background_sample_count(&mut self, value: usize) -> Result<(), ConfigError> {
        self.config.set_background_sample_count(value)
    }

    pub fn set_background_subtraction(&mut self, enabled: bool) {
        self.config.background.subtract = enabled;
    }

    pub fn set_key_color(&mut self, value: &str) -> Result<(), ConfigError> {
        self.config.set_key_color(value)
    }

    pub fn set_mirror_output(&mut self, mirror: bool) {
        self.config.display.mirror_output = mirror;
    }

    /// Read by `runner::run` when a run starts.
    pub fn set_refresh_rate_hz(&mut self, value: f64) -> Result<(), ConfigError> {
        self.config.set_refresh_rate_hz(value)
    }

    /// Switches the magnitude formula. Every stored sample is in the old
    /// formula's units, so the target is recomputed and the previous frame,
    /// motion buffers and background model are dropped.
    pub fn set_color_formula(&mut self, formula: MagnitudeFormula) {
        if formula == self.color_model.formula() {
            return;
        }
        self.config.color.formula = formula;
        self.color_model = ColorModel::new(formula);
        let [red, green, blue] = self.config.color.target_rgb;
        self.target = self.color_model.sample_rgb(red, green, blue);
        self.classifier.reset();
        self.motion_filter.clear();
        self.background.cancel();
        self.background.clear_model();
        info!(?formula, "colour formula changed");
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.config.display.mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if mode == DisplayMode::MotionTracker && self.config.display.mode != mode {
            self.motion_filter.clear();
        }
        self.config.display.mode = mode;
    }

    pub fn color_model(&self) -> &ColorModel {
        &self.color_model
    }

    pub fn target(&self) -> ColorSample {
        self.target
    }

    pub fn set_target_rgb(&mut self, red: u8, green: u8, blue: u8) {
        self.target = self.color_model.sample_rgb(red, green, blue);
        self.config.color.target_rgb = [red, green, blue];
    }

    /// Makes the average colour of the `sample_radius` square around `(x, y)`
    /// the new target.
    pub fn pick_target_color(&mut self, frame: &Frame, x: u32, y: u32) -> Result<ColorSample, VisionError> {
        let radius = self.config.color.sample_radius;
        let patch = Patch::around(&frame.data, frame.width, frame.height, x, y, radius)
            .ok_or(VisionError::EmptySamplePatch { x, y })?;
        let average = patch.average_pixel();
        self.set_target_rgb(average.red, average.green, average.blue);
        info!(x, y, pixels = patch.pixels.len(), sample = ?self.target, "target colour picked");
        Ok(self.target)
    }

    // --- Background ---

    /// Arms a capture that starts `capture_delay_ms` after `now`.
    pub fn request_background_capture(&mut self, now: Instant) {
        self.background.set_required(self.config.background.sample_count);
        let delay = Duration::from_millis(self.config.background.capture_delay_ms);
        self.background.arm(now + delay);
        info!(
            frames = self.config.background.sample_count,
            delay_ms = self.config.background.capture_delay_ms,
            "background capture requested"
        );
    }

    pub fn cancel_background_capture(&mut self) {
        self.background.cancel();
    }

    pub fn background_model(&self) -> Option<&BackgroundModel> {
        self.background.model()
    }

    pub fn clear_background(&mut self) {
        self.background.clear_model();
    }

    // --- Results ---

    /// Flags from the last classified tick.
    pub fn mask(&self) -> &ClassificationMask {
        &self.mask
    }

    /// Live blobs from the last blob tick, followed by ghosts.
    pub fn tracked_blobs(&self) -> &[Blob] {
        self.tracker.tracked()
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    // --- Ticking ---

    /// Processes one frame unless it arrives too soon after the last one.
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> Result<Option<Report>, VisionError> {
        let session = self.session.as_mut().ok_or(VisionError::NotRunning)?;
        let (expected_width, expected_height) = (session.info.width, session.info.height);
        if frame.width != expected_width
            || frame.height != expected_height
            || frame.data.len() != (frame.width * frame.height) as usize * CHANNELS
        {
            return Err(VisionError::FrameSizeMismatch {
                width: frame.width,
                height: frame.height,
                expected_width,
                expected_height,
            });
        }
        if !session.is_due(now) {
            trace!("tick skipped, frame interval not elapsed");
            return Ok(None);
        }
        session.last_tick = Some(now);

        Ok(Some(self.process(frame, now)))
    }

    fn process(&mut self, frame: &Frame, now: Instant) -> Report {
        let mode = self.config.display.mode;
        let (width, height) = (frame.width, frame.height);

        // --- 1. Sampling & Background Capture ---
        if mode == DisplayMode::Camera && self.background.is_idle() {
            return Report::Passthrough;
        }
        sample_frame(&self.color_model, &frame.data, &mut self.samples, width, self.classifier.workers());
        match self.background.observe(&self.samples, width, height, now) {
            CaptureProgress::Collecting { collected, required } => {
                return Report::CapturingBackground { collected, required };
            }
            CaptureProgress::Completed => info!("background capture complete"),
            CaptureProgress::Idle | CaptureProgress::Armed => {}
        }
        if mode == DisplayMode::Camera {
            return Report::Passthrough;
        }

        // --- 2. Classification ---
        let settings = ClassifierSettings {
            target: self.target,
            foreground: self.config.color.foreground,
            background: self.config.color.background,
            subtract_background: self.config.background.subtract || mode == DisplayMode::BackgroundSubtraction,
            motion_threshold: self.config.motion.threshold,
            hue_motion_weight: self.config.motion.hue_weight,
        };
        self.classifier
            .classify(&self.samples, width, height, &settings, self.background.model(), &mut self.mask);

        // --- 3. Display ---
        match mode {
            DisplayMode::Camera => Report::Passthrough,
            DisplayMode::BackgroundSubtraction => Report::Overlay(self.paint(frame, |flags| flags.background)),
            DisplayMode::ColorKey => Report::Overlay(self.paint(frame, MaskFlags::is_blob_candidate)),
            DisplayMode::MotionTracker => Report::MotionMask(self.motion_filter.apply(&self.mask).to_vec()),
            DisplayMode::Blobs => Report::Blobs(self.track_blobs(width)),
        }
    }

    /// Copies the frame and paints every pixel selected by `paint` in the key colour.
    fn paint(&self, frame: &Frame, paint: impl Fn(&MaskFlags) -> bool) -> Frame {
        let key = self.config.display.key_color.0;
        let mut overlay = frame.clone();
        for (pixel, flags) in overlay.data.chunks_exact_mut(CHANNELS).zip(self.mask.flags()) {
            if paint(flags) {
                pixel[..3].copy_from_slice(&key);
            }
        }
        overlay
    }

    fn track_blobs(&mut self, width: u32) -> Vec<BlobReport> {
        let extraction = ExtractionSettings {
            max_gap_x: self.config.blobs.distance_x,
            max_gap_y: self.config.blobs.distance_y,
            boundary_fraction: self.config.blobs.boundary_fraction,
            max_ttl: self.config.tracking.max_ttl,
        };
        let merging = MergeSettings {
            min_points: self.config.blobs.min_points,
            keep_merged: self.config.blobs.keep_merged,
        };

        let mut blobs = Vec::new();
        self.extractor.extract(&self.mask, &extraction, &mut blobs);
        let found = blobs.len();
        self.merger.reduce(&mut blobs, &merging, &mut self.retired);

        let analyzer = ShapeAnalyzer::new(width, self.config.display.mirror_output);
        for blob in blobs.iter_mut() {
            analyzer.analyze(blob);
        }

        let expired = self.tracker.update(blobs, width);
        self.extractor.recycle(expired);
        self.extractor.recycle(self.retired.drain(..));

        debug!(
            found,
            merges = self.merger.last_merges(),
            live = self.tracker.live().len(),
            ghosts = self.tracker.ghosts().len(),
            "blobs tracked"
        );
        let live = self.tracker.live().iter().map(|blob| BlobReport::from_blob(blob, false));
        let ghosts = self.tracker.ghosts().iter().map(|blob| BlobReport::from_blob(blob, true));
        live.chain(ghosts).collect()
    }
}
