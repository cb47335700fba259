// THEORY:
// The `MotionMaskFilter` cleans up the raw per-pixel motion signal before it is
// shown. The signal is written as an alpha mask, 0 where motion was detected and
// 255 where it was not, and a 3×3 minimum filter is run over it: a pixel reads as
// "still" only if it and all eight neighbours are still. Isolated still pixels
// inside a moving region are filled in and moving regions grow by one pixel.
//
// Neighbours outside the frame count as 0 (motion). The top and bottom rows are
// never filtered and always read as motion, and the left and right columns pick
// up motion from their missing neighbours, so the frame edge always shows as
// moving.
//
// The filter reads from one buffer and writes into the other, then swaps them,
// so no output pixel ever sees a neighbour that was already filtered.

use crate::core_modules::classifier::ClassificationMask;

pub const MOTION: u8 = 0;
pub const STILL: u8 = 255;

#[derive(Debug, Default)]
pub struct MotionMaskFilter {
    width: usize,
    height: usize,
    front: Vec<u8>,
    back: Vec<u8>,
}

impl MotionMaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops both buffers; the next pass starts from a clean slate.
    pub fn clear(&mut self) {
        self.front.clear();
        self.back.clear();
        self.width = 0;
        self.height = 0;
    }

    /// The most recently filtered mask.
    pub fn mask(&self) -> &[u8] {
        &self.front
    }

    /// Writes the mask's motion flags as alpha values and filters them.
    pub fn apply(&mut self, mask: &ClassificationMask) -> &[u8] {
        let (width, height) = (mask.width() as usize, mask.height() as usize);
        self.resize(width, height);
        for (alpha, flags) in self.front.iter_mut().zip(mask.flags()) {
            *alpha = if flags.motion { MOTION } else { STILL };
        }
        self.filter();
        &self.front
    }

    fn resize(&mut self, width: usize, height: usize) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.front = vec![MOTION; width * height];
            self.back = vec![MOTION; width * height];
        }
    }

    fn filter(&mut self) {
        let (width, height) = (self.width, self.height);
        if height < 3 {
            self.front.fill(MOTION);
            return;
        }
        let source = &self.front;
        let target = &mut self.back;
        target[..width].fill(MOTION);
        target[(height - 1) * width..].fill(MOTION);

        for y in 1..height - 1 {
            for x in 0..width {
                let mut value = STILL;
                for row in [y - 1, y, y + 1] {
                    let offset = row * width;
                    value = value.min(source[offset + x]);
                    value = value.min(if x > 0 { source[offset + x - 1] } else { MOTION });
                    value = value.min(if x + 1 < width { source[offset + x + 1] } else { MOTION });
                }
                target[y * width + x] = value;
            }
        }
        std::mem::swap(&mut self.front, &mut self.back);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::MaskFlags;

    fn motion_mask(width: u32, height: u32, moving: &[(u32, u32)]) -> ClassificationMask {
        let mut flags = vec![MaskFlags::default(); (width * height) as usize];
        for &(x, y) in moving {
            flags[(y * width + x) as usize].motion = true;
        }
        ClassificationMask::from_flags(width, height, flags)
    }

    #[test]
    fn still_frame_keeps_only_the_interior() {
        let mut filter = MotionMaskFilter::new();
        let out = filter.apply(&motion_mask(5, 4, &[])).to_vec();
        #[rustfmt::skip]
        let expected = vec![
            0, 0,   0,   0,   0,
            0, 255, 255, 255, 0,
            0, 255, 255, 255, 0,
            0, 0,   0,   0,   0,
        ];
        assert_eq!(out, expected);

        let out = filter.apply(&motion_mask(3, 2, &[])).to_vec();
        assert!(out.iter().all(|&value| value == MOTION));
    }

    #[test]
    fn motion_spreads_to_its_neighbours() {
        let mut filter = MotionMaskFilter::new();
        let out = filter.apply(&motion_mask(9, 9, &[(4, 4)])).to_vec();
        for y in 2..7u32 {
            for x in 2..7u32 {
                let value = out[(y * 9 + x) as usize];
                let near = x.abs_diff(4) <= 1 && y.abs_diff(4) <= 1;
                assert_eq!(value, if near { MOTION } else { STILL }, "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn passes_do_not_accumulate() {
        let mut filter = MotionMaskFilter::new();
        filter.apply(&motion_mask(9, 9, &[(4, 4)]));
        let out = filter.apply(&motion_mask(9, 9, &[])).to_vec();
        assert_eq!(out[4 * 9 + 4], STILL);
        assert_eq!(filter.mask(), out.as_slice());
    }
}
