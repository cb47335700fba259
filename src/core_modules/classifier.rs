// THEORY:
// The `PixelClassifier` is the per-pixel decision layer. For every pixel of a tick
// it answers three independent yes/no questions and writes them into a
// `ClassificationMask`:
//
// 1.  **Foreground**: is this pixel close enough to the target colour? Each of the
//     three distance components is tested against its own threshold; all three
//     must pass.
// 2.  **Background**: when background subtraction is on and a `BackgroundModel`
//     of the right size exists, the same three-way test against that pixel's
//     reference colour.
// 3.  **Motion**: has this pixel changed since the previous tick? The distance to
//     last tick's sample at the same position is folded into a weighted sum of
//     squares (only hue is weighted) and compared against `threshold²`. With no
//     previous tick there is nothing to compare with and motion is `false`.
//
// After classification the current samples become the "previous" buffer for the
// next tick.
//
// Every pixel is independent, so both sampling and classification are split into
// horizontal bands and run on scoped worker threads. The result is identical to a
// single sequential pass.

use crate::core_modules::background::BackgroundModel;
use crate::core_modules::color_model::{ChannelThresholds, ColorModel, ColorSample, color_distance};
use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use tracing::trace;

/// The three signals produced for a single pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaskFlags {
    pub foreground: bool,
    pub background: bool,
    pub motion: bool,
}

impl MaskFlags {
    /// A pixel the blob extractor should consume: target-coloured and not
    /// explained by the background.
    pub fn is_blob_candidate(&self) -> bool {
        self.foreground && !self.background
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationMask {
    width: u32,
    height: u32,
    flags: Vec<MaskFlags>,
}

impl ClassificationMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            flags: vec![MaskFlags::default(); (width * height) as usize],
        }
    }

    pub fn from_flags(width: u32, height: u32, flags: Vec<MaskFlags>) -> Self {
        debug_assert_eq!(flags.len(), (width * height) as usize);
        Self { width, height, flags }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn flags(&self) -> &[MaskFlags] {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut [MaskFlags] {
        &mut self.flags
    }

    pub fn get(&self, x: u32, y: u32) -> MaskFlags {
        self.flags[(y * self.width + x) as usize]
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.flags
            .resize((width * height) as usize, MaskFlags::default());
    }
}

/// Thresholds and targets for one tick's classification.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierSettings {
    pub target: ColorSample,
    pub foreground: ChannelThresholds,
    pub background: ChannelThresholds,
    pub subtract_background: bool,
    pub motion_threshold: f32,
    pub hue_motion_weight: f32,
}

pub struct PixelClassifier {
    previous: Option<Vec<ColorSample>>,
    workers: usize,
}

impl PixelClassifier {
    pub fn new(workers: usize) -> Self {
        Self {
            previous: None,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Forgets the previous frame; the next tick reports no motion.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn classify(
        &mut self,
        samples: &[ColorSample],
        width: u32,
        height: u32,
        settings: &ClassifierSettings,
        background: Option<&BackgroundModel>,
        mask: &mut ClassificationMask,
    ) {
        debug_assert_eq!(samples.len(), (width * height) as usize);
        mask.resize(width, height);

        let background = background
            .filter(|_| settings.subtract_background)
            .filter(|model| model.matches_size(width, height))
            .map(BackgroundModel::samples);
        let previous = self
            .previous
            .as_deref()
            .filter(|previous| previous.len() == samples.len());
        let motion_threshold_sq = settings.motion_threshold * settings.motion_threshold;

        for_each_band(&mut mask.flags, width as usize, self.workers, |start, band| {
            for (offset, flags) in band.iter_mut().enumerate() {
                let index = start + offset;
                let sample = &samples[index];

                let foreground = color_distance(sample, &settings.target).within(&settings.foreground);
                let background = background
                    .map(|reference| color_distance(sample, &reference[index]).within(&settings.background))
                    .unwrap_or(false);
                let motion = previous
                    .map(|previous| {
                        color_distance(sample, &previous[index])
                            .weighted_magnitude_sq(settings.hue_motion_weight)
                            >= motion_threshold_sq
                    })
                    .unwrap_or(false);

                *flags = MaskFlags {
                    foreground,
                    background,
                    motion,
                };
            }
        });

        match self.previous.as_mut() {
            Some(previous) if previous.len() == samples.len() => previous.copy_from_slice(samples),
            _ => self.previous = Some(samples.to_vec()),
        }
        trace!(width, height, workers = self.workers, "frame classified");
    }
}

/// Converts an RGBA buffer into one `ColorSample` per pixel.
pub fn sample_frame(model: &ColorModel, frame_buffer: &[u8], samples: &mut Vec<ColorSample>, width: u32, workers: usize) {
    let num_pixels = frame_buffer.len() / CHANNELS;
    samples.resize(num_pixels, ColorSample::default());

    for_each_band(samples, width as usize, workers, |start, band| {
        let bytes = &frame_buffer[start * CHANNELS..(start + band.len()) * CHANNELS];
        for (sample, pixel_bytes) in band.iter_mut().zip(bytes.chunks_exact(CHANNELS)) {
            *sample = model.sample(&Pixel::from(pixel_bytes));
        }
    });
}

/// Splits `items` into bands of whole rows and runs `work` on each band, in
/// parallel when more than one worker is available. `work` receives the index
/// of the band's first item.
fn for_each_band<T, F>(items: &mut [T], row_len: usize, workers: usize, work: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if items.is_empty() || row_len == 0 {
        return;
    }
    let rows = items.len().div_ceil(row_len);
    let workers = workers.clamp(1, rows);
    if workers == 1 {
        work(0, items);
        return;
    }

    let band_len = rows.div_ceil(workers) * row_len;
    std::thread::scope(|scope| {
        for (band_index, band) in items.chunks_mut(band_len).enumerate() {
            let work = &work;
            scope.spawn(move || work(band_index * band_len, band));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_model::MagnitudeFormula;

    fn settings(target: ColorSample) -> ClassifierSettings {
        ClassifierSettings {
            target,
            foreground: ChannelThresholds::new(2000.0, 8000.0, 120.0),
            background: ChannelThresholds::new(2000.0, 8000.0, 60.0),
            subtract_background: false,
            motion_threshold: 30.0,
            hue_motion_weight: 0.0,
        }
    }

    fn rgba(pixels: &[[u8; 3]]) -> Vec<u8> {
        pixels.iter().flat_map(|p| [p[0], p[1], p[2], 255]).collect()
    }

    #[test]
    fn foreground_requires_all_three_channels() {
        let model = ColorModel::new(MagnitudeFormula::Saturation);
        let frame = rgba(&[[220, 20, 20], [20, 220, 20], [100, 10, 10], [250, 250, 250]]);
        let mut samples = Vec::new();
        sample_frame(&model, &frame, &mut samples, 4, 1);

        let mut classifier = PixelClassifier::new(1);
        let mut mask = ClassificationMask::default();
        let settings = settings(model.sample_rgb(220, 20, 20));
        classifier.classify(&samples, 4, 1, &settings, None, &mut mask);

        let foreground: Vec<bool> = mask.flags().iter().map(|f| f.foreground).collect();
        // the dark red fails on intensity alone
        assert_eq!(foreground, vec![true, false, false, false]);
        assert!(mask.flags().iter().all(|f| !f.background && !f.motion));
    }

    #[test]
    fn first_frame_has_no_motion_then_changes_are_detected() {
        let model = ColorModel::new(MagnitudeFormula::Chroma);
        let mut classifier = PixelClassifier::new(1);
        let mut mask = ClassificationMask::default();
        let settings = settings(ColorSample::default());
        let mut samples = Vec::new();

        sample_frame(&model, &rgba(&[[10, 10, 10], [10, 10, 10]]), &mut samples, 2, 1);
        classifier.classify(&samples, 2, 1, &settings, None, &mut mask);
        assert!(mask.flags().iter().all(|f| !f.motion));

        sample_frame(&model, &rgba(&[[10, 10, 10], [200, 200, 200]]), &mut samples, 2, 1);
        classifier.classify(&samples, 2, 1, &settings, None, &mut mask);
        assert!(!mask.get(0, 0).motion);
        assert!(mask.get(1, 0).motion);

        classifier.reset();
        classifier.classify(&samples, 2, 1, &settings, None, &mut mask);
        assert!(mask.flags().iter().all(|f| !f.motion));
    }

    #[test]
    fn background_match_uses_the_model_when_enabled() {
        let model = ColorModel::new(MagnitudeFormula::Saturation);
        let wall = model.sample_rgb(90, 120, 160);
        let background = BackgroundModel::new(2, 1, vec![wall; 2]);
        let mut samples = Vec::new();
        sample_frame(&model, &rgba(&[[90, 120, 160], [220, 20, 20]]), &mut samples, 2, 1);

        let mut classifier = PixelClassifier::new(1);
        let mut mask = ClassificationMask::default();
        let mut settings = settings(model.sample_rgb(220, 20, 20));

        classifier.classify(&samples, 2, 1, &settings, Some(&background), &mut mask);
        assert!(!mask.get(0, 0).background, "subtraction disabled");

        settings.subtract_background = true;
        classifier.classify(&samples, 2, 1, &settings, Some(&background), &mut mask);
        assert!(mask.get(0, 0).background);
        assert!(!mask.get(1, 0).background);
        assert!(mask.get(1, 0).is_blob_candidate());
    }

    #[test]
    fn banded_classification_matches_sequential() {
        let model = ColorModel::new(MagnitudeFormula::Saturation);
        let (width, height) = (7u32, 9u32);
        let frame: Vec<u8> = (0..width * height)
            .flat_map(|i| [(i * 37 % 256) as u8, (i * 91 % 256) as u8, (i * 13 % 256) as u8, 255])
            .collect();
        let settings = settings(model.sample_rgb(200, 40, 30));

        let mut sequential = Vec::new();
        let mut banded = Vec::new();
        sample_frame(&model, &frame, &mut sequential, width, 1);
        sample_frame(&model, &frame, &mut banded, width, 4);
        assert_eq!(sequential, banded);

        let mut mask_a = ClassificationMask::default();
        let mut mask_b = ClassificationMask::default();
        PixelClassifier::new(1).classify(&sequential, width, height, &settings, None, &mut mask_a);
        PixelClassifier::new(4).classify(&banded, width, height, &settings, None, &mut mask_b);
        assert_eq!(mask_a.flags(), mask_b.flags());
    }
}
