// THEORY (Single Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the vision system. It is a
// "dumb" data container for one RGBA pixel of a frame plus the handful of
// single-pixel heuristics the colour model is built from. Nothing here knows about
// neighbours in space or time; comparisons live in `color_model`.
//
// Heuristic families:
// - Extremes:   max and min channel (used by every magnitude formula)
// - Brightness: raw channel sum (HSI intensity), mean, and HSL lightness
// - Hue:        position on the hue hexagon, measured in sixths of a turn [0, 6)
//
// Hue is returned in sixths rather than degrees so the colour model can scale it
// onto whatever circular domain it uses without a second division.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Sum = u16;
    pub type Sextant = f32;

    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        pub fn opaque(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, 255)
        }

        pub fn max_channel(&self) -> Channel {
            self.red.max(self.green.max(self.blue))
        }

        pub fn min_channel(&self) -> Channel {
            self.red.min(self.green.min(self.blue))
        }

        /// Raw RGB channel sum (0..765). This is the HSI intensity.
        pub fn sum(&self) -> Sum {
            self.red as Sum + self.green as Sum + self.blue as Sum
        }

        /// Chroma (C): max(R,G,B) - min(R,G,B). Zero means perfectly gray.
        pub fn chroma(&self) -> Channel {
            self.max_channel() - self.min_channel()
        }

        /// HSL lightness: midpoint of the max and min channels, on the 0..255 scale.
        pub fn lightness(&self) -> f32 {
            (self.max_channel() as f32 + self.min_channel() as f32) * 0.5
        }

        /// Hue position on the hexagon, in sixths of a full turn [0, 6).
        ///
        /// - The sector is picked from whichever channel is maximal, offset by 0, 2 or 4.
        /// - Returns `None` for gray pixels, whose hue is undefined.
        pub fn hue_sextant(&self) -> Option<Sextant> {
            let maximum_channel = self.max_channel();
            let chroma = self.chroma();
            if chroma == 0 {
                return None;
            }

            let red = self.red as f32;
            let green = self.green as f32;
            let blue = self.blue as f32;
            let inverse_chroma = 1.0 / chroma as f32;

            let mut sextant = if maximum_channel == self.red {
                (green - blue) * inverse_chroma
            } else if maximum_channel == self.green {
                (blue - red) * inverse_chroma + 2.0
            } else {
                (red - green) * inverse_chroma + 4.0
            };
            if sextant < 0.0 {
                sextant += 6.0;
            }
            Some(sextant)
        }
    }

    impl From<&[Byte]> for Pixel {
        fn from(bytes: &[Byte]) -> Self {
            if bytes.len() != CHANNELS {
                panic!("Cannot convert {} bytes into pixel.", bytes.len());
            }
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn primaries_land_on_even_sextants() {
        assert_eq!(Pixel::opaque(255, 0, 0).hue_sextant(), Some(0.0));
        assert_eq!(Pixel::opaque(0, 255, 0).hue_sextant(), Some(2.0));
        assert_eq!(Pixel::opaque(0, 0, 255).hue_sextant(), Some(4.0));
    }

    #[test]
    fn magenta_wraps_into_last_sextant() {
        // max is red, green - blue is negative
        let sextant = Pixel::opaque(255, 0, 128).hue_sextant().unwrap();
        assert!(sextant > 5.0 && sextant < 6.0, "got {sextant}");
    }

    #[test]
    fn gray_has_no_hue() {
        assert_eq!(Pixel::opaque(90, 90, 90).hue_sextant(), None);
        assert_eq!(Pixel::opaque(90, 90, 90).chroma(), 0);
    }

    #[test]
    fn brightness_heuristics() {
        let pixel = Pixel::opaque(255, 255, 255);
        assert_eq!(pixel.sum(), 765);
        assert_eq!(pixel.lightness(), 255.0);
        let pixel = Pixel::from(&[10u8, 20, 30, 255][..]);
        assert_eq!(pixel.max_channel(), 30);
        assert_eq!(pixel.min_channel(), 10);
        assert_eq!(<[u8; 4]>::from(pixel), [10, 20, 30, 255]);
    }
}
