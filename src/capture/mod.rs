//! Frame Capture Layer
//!
//! Frame sources feed the scanner one frame at a time. Camera access lives
//! outside this crate; here frames come from memory, a directory of still
//! images, or a recorded replay session.

pub mod frame;
pub mod replay;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

pub use frame::Frame;
pub use replay::load_replay;

/// Default spacing between frames of file-backed sources (about 30 fps)
pub const DEFAULT_FRAME_PERIOD_MS: u64 = 33;

/// Image file extensions picked up from a frame directory
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Failures while producing a frame
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to load frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Supplier of frames
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Frames held in memory, handed out in order
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

#[cfg(test)]
impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

#[cfg(test)]
impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frames.pop_front())
    }
}

/// Still images from a directory, in file name order, as a fixed-rate stream
#[derive(Debug)]
pub struct ImageDirSource {
    paths: VecDeque<PathBuf>,
    frame_period_ms: u64,
    next_seq: u64,
}

impl ImageDirSource {
    pub fn open(dir: &Path, frame_period_ms: u64) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            anyhow::bail!("No image files in {}", dir.display());
        }
        info!("Found {} frame images in {}", paths.len(), dir.display());

        Ok(Self {
            paths: paths.into(),
            frame_period_ms,
            next_seq: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let seq = self.next_seq;
        self.next_seq += 1;

        let image = load_rgba(&path)?;
        let frame = Frame::new(seq, seq.saturating_mul(self.frame_period_ms), image);
        debug!("Frame {} from {} (sharpness {:.1})", seq, path.display(), frame.sharpness);
        Ok(Some(frame))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub(crate) fn load_rgba(path: &Path) -> Result<image::RgbaImage, SourceError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| SourceError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_memory_source_in_order() {
        let mut source = MemorySource::new((0..3).map(|i| Frame::new(i, i * 10, RgbaImage::new(4, 4))));
        assert_eq!(source.frames.len(), 3);
        assert_eq!(source.next_frame().unwrap().unwrap().seq, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().seq, 1);
        assert_eq!(source.next_frame().unwrap().unwrap().seq, 2);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_dir_source() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(6, 4, Rgba([0, 0, 0, 255]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbaImage::from_pixel(8, 5, Rgba([255, 255, 255, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path(), 40).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.dimensions(), (8, 5));
        assert_eq!(first.captured_at_ms, 0);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.dimensions(), (6, 4));
        assert_eq!(second.seq, 1);
        assert_eq!(second.captured_at_ms, 40);

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_dir_source_long_period_saturates() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            RgbaImage::new(2, 2).save(dir.path().join(name)).unwrap();
        }

        let mut source = ImageDirSource::open(dir.path(), u64::MAX).unwrap();
        let times: Vec<u64> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|f| f.captured_at_ms)
            .collect();
        assert_eq!(times, vec![0, u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_image_dir_source_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDirSource::open(dir.path(), 33).is_err());
    }

    #[test]
    fn test_corrupt_image_is_source_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let mut source = ImageDirSource::open(dir.path(), 33).unwrap();
        assert!(matches!(source.next_frame(), Err(SourceError::Decode { .. })));
    }
}
