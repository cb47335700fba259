// THEORY:
// The renderer turns a frame plus its `Report` into a picture a person can look
// at. It is the only place that knows how results are drawn:
//
//   Passthrough / CapturingBackground   the camera frame
//   Overlay                             the painted frame
//   MotionMask                          the camera frame with the mask as alpha
//   Blobs                               the camera frame, each hull outlined and
//                                       each centroid crossed and labelled with
//                                       the blob's ID in the key colour
//
// Hulls and centroids arrive in display orientation, so when output is mirrored
// the frame is mirrored first and the geometry is drawn straight onto it.
//
// A `Sink` receives every processed tick. `PngSequenceSink` renders and writes
// one numbered PNG per tick.

use crate::config::KeyColor;
use crate::core_modules::blob::Point;
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::SinkError;
use crate::pipeline::{BlobReport, Report};
use crate::source::Frame;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CENTROID_ARM: i32 = 3;
const GLYPH_WIDTH: i32 = 3;
const GLYPH_HEIGHT: i32 = 5;

/// 3x5 digit bitmaps, one entry per row, leftmost column in the high bit.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

pub trait Sink: Send {
    fn present(&mut self, index: u64, frame: &Frame, report: &Report) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderer {
    key_color: KeyColor,
    mirror: bool,
}

impl Renderer {
    pub fn new(key_color: KeyColor, mirror: bool) -> Self {
        Self { key_color, mirror }
    }

    pub fn render(&self, frame: &Frame, report: &Report) -> RgbaImage {
        let mut image = match report {
            Report::Overlay(overlay) => to_image(overlay),
            _ => to_image(frame),
        };

        if let Report::MotionMask(mask) = report {
            for (pixel, alpha) in image.pixels_mut().zip(mask) {
                pixel.0[3] = *alpha;
            }
        }
        if self.mirror {
            image::imageops::flip_horizontal_in_place(&mut image);
        }
        if let Report::Blobs(blobs) = report {
            for blob in blobs {
                self.draw_blob(&mut image, blob);
            }
        }
        image
    }

    fn draw_blob(&self, image: &mut RgbaImage, blob: &BlobReport) {
        let color = Rgba(self.key_color.rgba());
        match blob.hull.as_slice() {
            [] => {}
            [only] => put_pixel(image, only.x, only.y, color),
            hull => {
                for (index, &from) in hull.iter().enumerate() {
                    let to = hull[(index + 1) % hull.len()];
                    draw_line(image, from, to, color);
                }
            }
        }

        let (cx, cy) = (blob.centroid.0.round() as i32, blob.centroid.1.round() as i32);
        draw_line(
            image,
            Point::new(cx - CENTROID_ARM, cy),
            Point::new(cx + CENTROID_ARM, cy),
            color,
        );
        draw_line(
            image,
            Point::new(cx, cy - CENTROID_ARM),
            Point::new(cx, cy + CENTROID_ARM),
            color,
        );

        if let Some(id) = blob.id {
            let origin = Point::new(cx + CENTROID_ARM + 2, cy - CENTROID_ARM - GLYPH_HEIGHT);
            draw_number(image, id, origin, color);
        }
    }
}

fn to_image(frame: &Frame) -> RgbaImage {
    RgbaImage::from_fn(frame.width, frame.height, |x, y| {
        let index = ((y * frame.width + x) * 4) as usize;
        Rgba([
            frame.data[index],
            frame.data[index + 1],
            frame.data[index + 2],
            frame.data[index + 3],
        ])
    })
}

fn put_pixel(image: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

/// Integer line rasterisation; points outside the image are clipped.
pub fn draw_line(image: &mut RgbaImage, from: Point, to: Point, color: Rgba<u8>) {
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let step_x = if from.x < to.x { 1 } else { -1 };
    let step_y = if from.y < to.y { 1 } else { -1 };
    let mut error = dx + dy;
    let (mut x, mut y) = (from.x, from.y);

    loop {
        put_pixel(image, x, y, color);
        if x == to.x && y == to.y {
            break;
        }
        let doubled = 2 * error;
        if doubled >= dy {
            error += dy;
            x += step_x;
        }
        if doubled <= dx {
            error += dx;
            y += step_y;
        }
    }
}

/// Writes `value` in decimal with its top-left corner at `origin`.
pub fn draw_number(image: &mut RgbaImage, value: u32, origin: Point, color: Rgba<u8>) {
    for (index, digit) in value.to_string().bytes().enumerate() {
        let glyph = &DIGITS[(digit - b'0') as usize];
        let left = origin.x + index as i32 * (GLYPH_WIDTH + 1);
        for (row, bits) in glyph.iter().enumerate() {
            for column in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - column)) & 1 == 1 {
                    put_pixel(image, left + column, origin.y + row as i32, color);
                }
            }
        }
    }
}

/// Renders every tick into `frame_NNNNNN.png` inside a directory.
#[derive(Debug)]
pub struct PngSequenceSink {
    directory: PathBuf,
    renderer: Renderer,
    written: u64,
}

impl PngSequenceSink {
    pub fn create(directory: &Path, renderer: Renderer) -> Result<Self, SinkError> {
        std::fs::create_dir_all(directory)?;
        info!(directory = %directory.display(), "writing rendered frames");
        Ok(Self {
            directory: directory.to_path_buf(),
            renderer,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Sink for PngSequenceSink {
    fn present(&mut self, index: u64, frame: &Frame, report: &Report) -> Result<(), SinkError> {
        let image = self.renderer.render(frame, report);
        let path = self.directory.join(format!("frame_{index:06}.png"));
        image_helper::save_png(&path, image.width(), image.height(), image.as_raw())?;
        self.written += 1;
        debug!(index, path = %path.display(), "frame written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const KEY: KeyColor = KeyColor([0, 255, 0]);

    #[test]
    fn lines_cover_both_endpoints() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba(BLACK));
        let green = Rgba(KEY.rgba());
        draw_line(&mut image, Point::new(1, 1), Point::new(7, 4), green);
        assert_eq!(*image.get_pixel(1, 1), green);
        assert_eq!(*image.get_pixel(7, 4), green);
        let painted = image.pixels().filter(|p| **p == green).count();
        assert_eq!(painted, 7);
    }

    #[test]
    fn lines_are_clipped() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba(BLACK));
        draw_line(&mut image, Point::new(-5, 2), Point::new(10, 2), Rgba(KEY.rgba()));
        assert!((0..4).all(|x| image.get_pixel(x, 2).0 == KEY.rgba()));
    }

    #[test]
    fn mirrored_passthrough() {
        let mut frame = Frame::filled(3, 1, BLACK);
        frame.data[0..4].copy_from_slice(&[255, 0, 0, 255]);
        let image = Renderer::new(KEY, true).render(&frame, &Report::Passthrough);
        assert_eq!(image.get_pixel(2, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(0, 0).0, BLACK);
    }

    #[test]
    fn motion_mask_becomes_alpha() {
        let frame = Frame::filled(2, 1, [9, 9, 9, 255]);
        let image = Renderer::new(KEY, false).render(&frame, &Report::MotionMask(vec![0, 255]));
        assert_eq!(image.get_pixel(0, 0).0, [9, 9, 9, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn blobs_are_outlined_with_a_centroid_cross() {
        let frame = Frame::filled(20, 20, BLACK);
        let blob = BlobReport {
            id: Some(0),
            centroid: (10.0, 10.0),
            hull: vec![Point::new(2, 2), Point::new(17, 2), Point::new(17, 17), Point::new(2, 17)],
            num_points: 256,
            ghost: false,
        };
        let image = Renderer::new(KEY, true).render(&frame, &Report::Blobs(vec![blob]));
        let key = KEY.rgba();
        assert_eq!(image.get_pixel(2, 2).0, key);
        assert_eq!(image.get_pixel(17, 9).0, key);
        assert_eq!(image.get_pixel(10, 10).0, key);
        assert_eq!(image.get_pixel(13, 10).0, key);
        assert_eq!(image.get_pixel(5, 5).0, BLACK);
        // ID 0 written above and to the right of the cross
        assert_eq!(image.get_pixel(15, 4).0, key);
        assert_eq!(image.get_pixel(16, 4).0, BLACK);
    }

    #[test]
    fn numbers_are_drawn_digit_by_digit() {
        let mut image = RgbaImage::from_pixel(8, 5, Rgba(BLACK));
        let green = Rgba(KEY.rgba());
        draw_number(&mut image, 10, Point::new(0, 0), green);
        // "1": middle column on the first row
        assert_eq!(*image.get_pixel(1, 0), green);
        assert_eq!(image.get_pixel(0, 0).0, BLACK);
        // "0" starts four columns later and is hollow
        assert_eq!(*image.get_pixel(4, 1), green);
        assert_eq!(image.get_pixel(5, 1).0, BLACK);
        assert_eq!(*image.get_pixel(6, 1), green);
    }

    #[test]
    fn labels_are_clipped_at_the_border() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba(BLACK));
        draw_number(&mut image, 987, Point::new(-2, -3), Rgba(KEY.rgba()));
        assert_eq!(image.dimensions(), (2, 2));
    }

    #[test]
    fn png_sink_numbers_its_files() {
        let dir = std::env::temp_dir().join(format!("chroma_vision_sink_{}", std::process::id()));
        let mut sink = PngSequenceSink::create(&dir, Renderer::new(KEY, false)).unwrap();
        let frame = Frame::filled(4, 3, BLACK);
        sink.present(7, &frame, &Report::Passthrough).unwrap();
        let written = dir.join("frame_000007.png");
        let exists = written.exists();
        let decoded = image_helper::load_rgba(&written);
        std::fs::remove_dir_all(&dir).ok();
        assert!(exists);
        assert_eq!(sink.written(), 1);
        let (width, height, _) = decoded.unwrap();
        assert_eq!((width, height), (4, 3));
    }
}
