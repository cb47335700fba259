// THEORY:
// A `FrameSource` is whatever supplies pixels: a camera, a recorded sequence, a
// test fixture. The pipeline only needs two things from it:
// 1.  `negotiate`: before anything else, the source reports its frame size and
//     frame rate, or fails (device missing, permission refused). A failure here
//     stops the session before any pipeline state is created.
// 2.  `next_frame`: one RGBA frame per call, or `None` when the source has run
//     dry. Every frame of a session has the negotiated size.
//
// Two sources ship with the crate: `ImageSequenceSource` plays back a directory
// of still images in file-name order, and `MemorySource` plays back frames held
// in memory.

use crate::core_modules::pixel::pixel::CHANNELS;
use crate::core_modules::utils::image_helper::image_helper;
use crate::error::SourceError;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// One RGBA8 frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize * CHANNELS);
        Self { width, height, data }
    }

    /// A frame filled with one colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat((width * height) as usize);
        Self::new(width, height, data)
    }
}

/// What a source agreed to deliver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

pub trait FrameSource: Send {
    fn negotiate(&mut self) -> Result<SourceInfo, SourceError>;

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

fn classify_io(path: &Path, error: std::io::Error) -> SourceError {
    match error.kind() {
        ErrorKind::NotFound => SourceError::Unavailable(path.display().to_string()),
        ErrorKind::PermissionDenied => SourceError::PermissionDenied(path.display().to_string()),
        _ => SourceError::Io(error),
    }
}

/// Plays back a directory of still images, sorted by file name.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    frame_rate: f64,
    next_index: usize,
    size: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    pub fn open(directory: &Path, frame_rate: f64) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(directory).map_err(|error| classify_io(directory, error))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()));
            if is_image {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(SourceError::Empty);
        }
        paths.sort();
        info!(frames = paths.len(), directory = %directory.display(), "image sequence opened");
        Ok(Self {
            paths,
            frame_rate,
            next_index: 0,
            size: None,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn load(&self, index: usize) -> Result<Frame, SourceError> {
        let path = &self.paths[index];
        let (width, height, data) = image_helper::load_rgba(path).map_err(|error| match error {
            image::ImageError::IoError(io) => classify_io(path, io),
            other => SourceError::Decode(other),
        })?;
        Ok(Frame::new(width, height, data))
    }
}

impl FrameSource for ImageSequenceSource {
    fn negotiate(&mut self) -> Result<SourceInfo, SourceError> {
        let first = self.load(0)?;
        self.size = Some((first.width, first.height));
        self.next_index = 0;
        Ok(SourceInfo {
            width: first.width,
            height: first.height,
            frame_rate: self.frame_rate,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.next_index >= self.paths.len() {
            return Ok(None);
        }
        let index = self.next_index;
        let frame = self.load(index)?;
        self.next_index += 1;

        if let Some((expected_width, expected_height)) = self.size {
            if (frame.width, frame.height) != (expected_width, expected_height) {
                return Err(SourceError::InconsistentSize {
                    index,
                    width: frame.width,
                    height: frame.height,
                    expected_width,
                    expected_height,
                });
            }
        }
        debug!(index, "frame loaded");
        Ok(Some(frame))
    }
}

/// Plays back frames held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
    frame_rate: f64,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>, frame_rate: f64) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            frame_rate,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn negotiate(&mut self) -> Result<SourceInfo, SourceError> {
        let first = self.frames.front().ok_or(SourceError::Empty)?;
        Ok(SourceInfo {
            width: first.width,
            height: first.height,
            frame_rate: self.frame_rate,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chroma_vision_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn memory_source_plays_frames_in_order() {
        let mut source = MemorySource::new(
            [Frame::filled(2, 2, [1, 1, 1, 255]), Frame::filled(2, 2, [2, 2, 2, 255])],
            30.0,
        );
        let info = source.negotiate().unwrap();
        assert_eq!((info.width, info.height, info.frame_rate), (2, 2, 30.0));
        assert_eq!(source.next_frame().unwrap().unwrap().data[0], 1);
        assert_eq!(source.next_frame().unwrap().unwrap().data[0], 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_memory_source_cannot_negotiate() {
        let mut source = MemorySource::new([], 30.0);
        assert!(matches!(source.negotiate(), Err(SourceError::Empty)));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let missing = std::env::temp_dir().join("chroma_vision_no_such_sequence");
        assert!(matches!(
            ImageSequenceSource::open(&missing, 30.0),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn image_sequence_is_sorted_and_size_checked() {
        let dir = scratch_dir("sequence");
        let save = |name: &str, width: u32, height: u32, value: u8| {
            let data = [value, value, value, 255].repeat((width * height) as usize);
            image_helper::save_png(&dir.join(name), width, height, &data).unwrap();
        };
        save("frame_002.png", 3, 2, 20);
        save("frame_001.png", 3, 2, 10);
        save("frame_003.png", 4, 2, 30);
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 15.0).unwrap();
        assert_eq!(source.len(), 3);
        let info = source.negotiate().unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert_eq!(source.next_frame().unwrap().unwrap().data[0], 10);
        assert_eq!(source.next_frame().unwrap().unwrap().data[0], 20);
        let mismatch = source.next_frame();
        std::fs::remove_dir_all(&dir).ok();
        assert!(matches!(mismatch, Err(SourceError::InconsistentSize { index: 2, .. })));
    }

    #[test]
    fn directory_without_images_is_empty() {
        let dir = scratch_dir("no_images");
        std::fs::write(dir.join("readme.md"), "nothing here").unwrap();
        let result = ImageSequenceSource::open(&dir, 15.0);
        std::fs::remove_dir_all(&dir).ok();
        assert!(matches!(result, Err(SourceError::Empty)));
    }
}
