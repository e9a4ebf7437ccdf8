use std::time::Duration;

use image::{GrayImage, RgbaImage};

use super::error::VideoError;

/// 帧数据结构
///
/// A sampled video frame. Pixel data is RGBA, row-major. Frames are never
/// mutated once produced; cleaning steps build new frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: Duration, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
            frame_number,
        }
    }

    /// 校验缓冲区长度后构造
    pub fn try_new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
        frame_number: u64,
    ) -> Result<Self, VideoError> {
        let expected = width as usize * height as usize * 4;
        if expected == 0 || data.len() != expected {
            return Err(VideoError::InvalidFrame {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::new(width, height, data, timestamp, frame_number))
    }

    /// Builds a frame from a sample timestamp given in seconds.
    pub fn at_secs(width: u32, height: u32, data: Vec<u8>, secs: f64, frame_number: u64) -> Self {
        Self::new(width, height, data, secs_to_duration(secs), frame_number)
    }

    pub fn from_image(image: RgbaImage, timestamp: Duration, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw(), timestamp, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }

    /// True when the buffer holds exactly `width * height` RGBA pixels.
    pub fn is_well_formed(&self) -> bool {
        self.pixel_count() > 0 && self.data.len() == self.pixel_count() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0 || self.data.is_empty()
    }

    /// Same geometry and timing, new pixels.
    pub fn with_data(&self, data: Vec<u8>) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            data,
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        }
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        if !self.is_well_formed() {
            return None;
        }
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// BT.601 luma, one byte per pixel.
    pub fn luma(&self) -> Vec<u8> {
        self.data.chunks_exact(4).map(|rgba| luma_of(rgba[0], rgba[1], rgba[2])).collect()
    }

    pub fn to_gray_image(&self) -> Option<GrayImage> {
        if !self.is_well_formed() {
            return None;
        }
        GrayImage::from_raw(self.width, self.height, self.luma())
    }
}

/// 秒数转 `Duration`：负数和 NaN 取 0，超出范围（含无穷大）取 `Duration::MAX`
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[inline]
pub fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}
