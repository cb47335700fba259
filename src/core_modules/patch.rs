// THEORY:
// The `Patch` module represents a small rectangular group of pixels cut out of a
// frame. Its one job is to summarise them as a single average pixel, which is how
// a target colour is picked: the user points at the object, and the patch around
// that point is averaged so one noisy sensor pixel cannot skew the choice.
//
// Like `Pixel`, `Patch` is a "dumb" data container. Clamping the requested window
// to the frame happens in `Patch::around`, so callers can ask for a patch at the
// very edge of the image.

pub mod patch {
    use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};

    /// A "dumb" data container representing a rectangular block of pixels.
    pub struct Patch {
        /// The width of the patch in pixels.
        pub width: u32,
        /// The height of the patch in pixels.
        pub height: u32,
        /// A flattened vector containing all the `Pixel` data within this patch.
        pub pixels: Vec<Pixel>,
    }

    impl Patch {
        pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Self {
            debug_assert_eq!(pixels.len(), (width * height) as usize);
            Self {
                width,
                height,
                pixels,
            }
        }

        /// Cuts the `(x ± radius, y ± radius)` window out of an RGBA buffer,
        /// clamped to the frame. Returns `None` when nothing is left.
        pub fn around(
            frame_buffer: &[u8],
            frame_width: u32,
            frame_height: u32,
            x: u32,
            y: u32,
            radius: u32,
        ) -> Option<Self> {
            if x >= frame_width || y >= frame_height {
                return None;
            }
            let min_x = x.saturating_sub(radius);
            let min_y = y.saturating_sub(radius);
            let max_x = (x + radius).min(frame_width - 1);
            let max_y = (y + radius).min(frame_height - 1);
            let width = max_x - min_x + 1;
            let height = max_y - min_y + 1;

            let mut pixels = Vec::with_capacity((width * height) as usize);
            for pixel_y in min_y..=max_y {
                for pixel_x in min_x..=max_x {
                    let byte_index = ((pixel_y * frame_width + pixel_x) as usize) * CHANNELS;
                    let pixel_bytes = frame_buffer.get(byte_index..byte_index + CHANNELS)?;
                    pixels.push(Pixel::from(pixel_bytes));
                }
            }
            Some(Self::new(width, height, pixels))
        }

        /// Calculates the average pixel value for the entire patch.
        pub fn average_pixel(&self) -> Pixel {
            let num_pixels = self.pixels.len();
            if num_pixels == 0 {
                return Pixel::default();
            }

            let mut sum_r = 0u64;
            let mut sum_g = 0u64;
            let mut sum_b = 0u64;
            let mut sum_a = 0u64;
            for pixel in &self.pixels {
                sum_r += pixel.red as u64;
                sum_g += pixel.green as u64;
                sum_b += pixel.blue as u64;
                sum_a += pixel.alpha as u64;
            }

            let n = num_pixels as u64;
            Pixel {
                red: ((sum_r + n / 2) / n) as u8,
                green: ((sum_g + n / 2) / n) as u8,
                blue: ((sum_b + n / 2) / n) as u8,
                alpha: ((sum_a + n / 2) / n) as u8,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::patch::Patch;

    fn frame(width: u32, height: u32, fill: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                buffer.extend_from_slice(&fill(x, y));
            }
        }
        buffer
    }

    #[test]
    fn averages_the_window() {
        let buffer = frame(4, 4, |x, _| if x < 2 { [100, 0, 0, 255] } else { [200, 0, 0, 255] });
        let patch = Patch::around(&buffer, 4, 4, 1, 1, 1).unwrap();
        assert_eq!((patch.width, patch.height), (3, 3));
        // columns 0,1 at 100 and column 2 at 200
        assert_eq!(patch.average_pixel().red, 133);
    }

    #[test]
    fn clamps_at_the_corner() {
        let buffer = frame(3, 3, |_, _| [9, 9, 9, 255]);
        let patch = Patch::around(&buffer, 3, 3, 0, 0, 5).unwrap();
        assert_eq!((patch.width, patch.height), (3, 3));
        assert_eq!(patch.average_pixel().green, 9);
    }

    #[test]
    fn outside_the_frame_is_empty() {
        let buffer = frame(3, 3, |_, _| [0, 0, 0, 255]);
        assert!(Patch::around(&buffer, 3, 3, 3, 0, 1).is_none());
    }
}
