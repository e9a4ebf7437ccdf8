use serde::{Deserialize, Serialize};

use super::analysis::laplacian_variance;
use super::frame::Frame;

/// 质量门限配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_width: u32,
    pub min_height: u32,
    /// 平均亮度下限（0-255），挡住转场黑帧
    pub min_brightness: f64,
    /// 平均亮度上限，挡住过曝帧
    pub max_brightness: f64,
    /// 拉普拉斯方差下限，挡住运动模糊/失焦帧
    pub min_sharpness: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 320,
            min_height: 240,
            min_brightness: 20.0,
            max_brightness: 235.0,
            min_sharpness: 50.0,
        }
    }
}

/// Why a frame was rejected. Rejection is a normal filtering outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityVerdict {
    Accept,
    Empty,
    TooSmall,
    TooDark(f64),
    TooBright(f64),
    Blurry(f64),
}

impl QualityVerdict {
    pub fn is_reject(&self) -> bool {
        !matches!(self, QualityVerdict::Accept)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameQualityGate {
    config: QualityConfig,
}

impl FrameQualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// `true` 表示跳过该帧
    pub fn is_low_quality(&self, frame: &Frame) -> bool {
        self.evaluate(frame).is_reject()
    }

    pub fn evaluate(&self, frame: &Frame) -> QualityVerdict {
        if frame.is_empty() || !frame.is_well_formed() {
            return QualityVerdict::Empty;
        }

        if frame.width < self.config.min_width || frame.height < self.config.min_height {
            return QualityVerdict::TooSmall;
        }

        let gray = frame.luma();
        let mean = gray.iter().map(|&v| v as u64).sum::<u64>() as f64 / gray.len() as f64;
        if mean < self.config.min_brightness {
            return QualityVerdict::TooDark(mean);
        }
        if mean > self.config.max_brightness {
            return QualityVerdict::TooBright(mean);
        }

        let sharpness = laplacian_variance(&gray, frame.width, frame.height);
        if sharpness < self.config.min_sharpness {
            return QualityVerdict::Blurry(sharpness);
        }

        QualityVerdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::test_support::{slide_frame, uniform_frame};

    #[test]
    fn test_black_frame_rejected() {
        let gate = FrameQualityGate::new();
        let frame = uniform_frame(640, 480, 0, 0.0);
        assert!(gate.is_low_quality(&frame));
        assert!(matches!(gate.evaluate(&frame), QualityVerdict::TooDark(m) if m < 1.0));
    }

    #[test]
    fn test_blown_out_frame_rejected() {
        let gate = FrameQualityGate::new();
        let frame = uniform_frame(640, 480, 250, 0.0);
        assert!(matches!(gate.evaluate(&frame), QualityVerdict::TooBright(_)));
    }

    #[test]
    fn test_flat_frame_rejected_as_blurry() {
        let gate = FrameQualityGate::new();
        let frame = uniform_frame(640, 480, 128, 0.0);
        assert!(matches!(gate.evaluate(&frame), QualityVerdict::Blurry(_)));
    }

    #[test]
    fn test_small_and_empty_frames_rejected() {
        let gate = FrameQualityGate::new();
        assert_eq!(gate.evaluate(&slide_frame(1, 200, 240, 0.0)), QualityVerdict::TooSmall);
        assert_eq!(gate.evaluate(&slide_frame(1, 320, 100, 0.0)), QualityVerdict::TooSmall);
        assert_eq!(gate.evaluate(&Frame::at_secs(0, 0, vec![], 0.0, 0)), QualityVerdict::Empty);
        assert_eq!(gate.evaluate(&Frame::at_secs(640, 480, vec![1, 2, 3], 0.0, 0)), QualityVerdict::Empty);
    }

    #[test]
    fn test_sharp_slide_accepted() {
        let gate = FrameQualityGate::new();
        let frame = slide_frame(7, 640, 480, 0.0);
        assert_eq!(gate.evaluate(&frame), QualityVerdict::Accept);
    }

    #[test]
    fn test_gate_is_deterministic() {
        let gate = FrameQualityGate::new();
        let frames = [slide_frame(3, 320, 240, 0.0), uniform_frame(320, 240, 5, 0.0)];
        for frame in &frames {
            let first = gate.is_low_quality(frame);
            for _ in 0..5 {
                assert_eq!(gate.is_low_quality(frame), first);
            }
        }
    }

    #[test]
    fn test_thresholds_overridable() {
        let gate = FrameQualityGate::with_config(QualityConfig {
            min_brightness: 0.0,
            min_sharpness: 0.0,
            ..Default::default()
        });
        // 亮度 0 且无纹理的帧，在放宽门限后仍满足 "亮度 >= 0"、"方差 >= 0"
        assert!(!gate.is_low_quality(&uniform_frame(640, 480, 0, 0.0)));
    }
}
