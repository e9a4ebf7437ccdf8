use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use rayon::prelude::*;

use super::error::ExtractError;
use crate::core::video::Frame;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 有序、有限的帧序列
pub trait FrameSource {
    fn frames(&self) -> Result<Vec<Frame>, ExtractError>;
}

/// 目录中按文件名排序的采样图片，时间戳 = 序号 × 采样间隔
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    interval: Duration,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn image_paths(&self) -> Result<Vec<PathBuf>, ExtractError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            } else {
                debug!("⏭️ skipping {}", path.display());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageSequenceSource {
    fn frames(&self) -> Result<Vec<Frame>, ExtractError> {
        let paths = self.image_paths()?;
        if paths.is_empty() {
            return Err(ExtractError::NoFrames(self.dir.clone()));
        }

        let frames = paths
            .par_iter()
            .enumerate()
            .map(|(i, path)| -> Result<Frame, ExtractError> {
                let image = image::open(path)?.to_rgba8();
                let timestamp = self.interval.saturating_mul(i as u32);
                Ok(Frame::from_image(image, timestamp, i as u64))
            })
            .collect::<Result<Vec<Frame>, ExtractError>>()?;

        info!("🎞️ loaded {} frames from {}", frames.len(), self.dir.display());
        Ok(frames)
    }
}

/// 内存中的帧（测试、嵌入调用）
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    frames: Vec<Frame>,
}

impl InMemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

impl FrameSource for InMemorySource {
    fn frames(&self) -> Result<Vec<Frame>, ExtractError> {
        Ok(self.frames.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_image(dir: &Path, name: &str, value: u8) {
        let image = RgbaImage::from_pixel(8, 6, Rgba([value, value, value, 255]));
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_frames_sorted_by_name_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "frame_002.png", 20);
        write_image(dir.path(), "frame_000.png", 0);
        write_image(dir.path(), "frame_001.png", 10);
        fs::write(dir.path().join("readme.txt"), "not a frame").unwrap();

        let source = ImageSequenceSource::new(dir.path(), Duration::from_secs(2));
        let frames = source.frames().unwrap();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.frame_number, i as u64);
            assert_eq!(frame.timestamp, Duration::from_secs(2 * i as u64));
            assert_eq!(frame.data[0], (i * 10) as u8);
            assert_eq!((frame.width, frame.height), (8, 6));
        }
    }

    #[test]
    fn test_empty_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ImageSequenceSource::new(dir.path(), Duration::from_secs(1));
        assert!(matches!(source.frames(), Err(ExtractError::NoFrames(_))));
    }

    #[test]
    fn test_corrupt_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("frame_000.png"), b"not a png").unwrap();
        let source = ImageSequenceSource::new(dir.path(), Duration::from_secs(1));
        assert!(matches!(source.frames(), Err(ExtractError::Image(_))));
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let source = ImageSequenceSource::new("/nonexistent/frames", Duration::from_secs(1));
        assert!(matches!(source.frames(), Err(ExtractError::Io(_))));
    }
}
