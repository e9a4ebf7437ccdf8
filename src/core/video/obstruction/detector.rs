use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::cascade::{CascadeParams, DetectionBox, HaarCascade};
use super::region::{merge_overlapping, ObstructionKind, ObstructionRegion};
use crate::core::video::analysis::canny_edge_density;
use crate::core::video::frame::Frame;

/// 人脸检测接口；级联分类器给不出连续分数，置信度由调用方固定
pub trait FaceDetector: Send + Sync {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<DetectionBox>;
}

pub struct CascadeFaceDetector {
    cascade: HaarCascade,
    params: CascadeParams,
}

impl CascadeFaceDetector {
    pub fn new(cascade: HaarCascade) -> Self {
        Self::with_params(cascade, CascadeParams::default())
    }

    pub fn with_params(cascade: HaarCascade, params: CascadeParams) -> Self {
        Self { cascade, params }
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<DetectionBox> {
        self.cascade.detect(gray, width, height, &self.params)
    }
}

/// 固定返回给定框的检测器（测试用）
pub struct MockFaceDetector {
    boxes: Vec<DetectionBox>,
}

impl MockFaceDetector {
    pub fn with_boxes(boxes: Vec<DetectionBox>) -> Self {
        Self { boxes }
    }
}

impl FaceDetector for MockFaceDetector {
    fn detect_faces(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<DetectionBox> {
        self.boxes.clone()
    }
}

/// Frame-relative probe rectangle, fractions of width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayProbe {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub face_confidence: f32,
    /// 人脸框向四周扩展的比例，覆盖躯干
    pub face_expansion: f32,
    pub overlay_probes: Vec<OverlayProbe>,
    pub edge_density_threshold: f32,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            face_confidence: 0.7,
            face_expansion: 0.3,
            overlay_probes: vec![
                // 底部居中（社交账号）
                OverlayProbe { x: 0.30, y: 0.85, width: 0.40, height: 0.10 },
                // 右下角
                OverlayProbe { x: 0.75, y: 0.85, width: 0.20, height: 0.10 },
                // 右上角（台标）
                OverlayProbe { x: 0.80, y: 0.05, width: 0.15, height: 0.10 },
            ],
            edge_density_threshold: 0.1,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// 遮挡检测器：人脸 + 叠加层探测 + 重叠合并
#[derive(Clone, Default)]
pub struct ObstructionDetector {
    face_detector: Option<Arc<dyn FaceDetector>>,
    config: DetectorConfig,
}

impl ObstructionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            face_detector: None,
            config,
        }
    }

    pub fn with_face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 空列表是常态，不是错误
    pub fn detect(&self, frame: &Frame) -> Vec<ObstructionRegion> {
        if !frame.is_well_formed() {
            return Vec::new();
        }
        let gray = frame.luma();

        let mut regions = self.detect_faces(&gray, frame.width, frame.height);
        regions.extend(self.detect_overlays(&gray, frame.width, frame.height));

        let merged = merge_overlapping(regions);
        if !merged.is_empty() {
            debug!(
                "🧹 frame #{}: {} obstruction region(s)",
                frame.frame_number,
                merged.len()
            );
        }
        merged
    }

    fn detect_faces(&self, gray: &[u8], width: u32, height: u32) -> Vec<ObstructionRegion> {
        let Some(detector) = &self.face_detector else {
            return Vec::new();
        };

        let expansion = self.config.face_expansion.max(0.0);
        detector
            .detect_faces(gray, width, height)
            .into_iter()
            .filter_map(|b| {
                let dx = (b.width as f32 * expansion) as u32;
                let dy = (b.height as f32 * expansion) as u32;
                let x = b.x.saturating_sub(dx);
                let y = b.y.saturating_sub(dy);
                let right = (b.x + b.width + dx).min(width);
                let bottom = (b.y + b.height + dy).min(height);
                if right <= x || bottom <= y {
                    return None;
                }
                Some(ObstructionRegion::new(
                    x,
                    y,
                    right - x,
                    bottom - y,
                    self.config.face_confidence,
                    ObstructionKind::Face,
                ))
            })
            .collect()
    }

    fn detect_overlays(&self, gray: &[u8], width: u32, height: u32) -> Vec<ObstructionRegion> {
        let mut regions = Vec::new();
        let w = width as usize;

        for probe in &self.config.overlay_probes {
            let x = (width as f32 * probe.x) as u32;
            let y = (height as f32 * probe.y) as u32;
            let pw = (width as f32 * probe.width) as u32;
            let ph = (height as f32 * probe.height) as u32;
            let Some(rect) = ObstructionRegion::new(x, y, pw, ph, 0.0, ObstructionKind::Overlay)
                .clamped_to(width, height)
            else {
                continue;
            };

            let mut roi = Vec::with_capacity(rect.area() as usize);
            for row in rect.y..rect.bottom() {
                let start = row as usize * w + rect.x as usize;
                roi.extend_from_slice(&gray[start..start + rect.width as usize]);
            }

            let density = canny_edge_density(
                &roi,
                rect.width,
                rect.height,
                self.config.canny_low,
                self.config.canny_high,
            );
            if density > self.config.edge_density_threshold {
                regions.push(ObstructionRegion::new(
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                    density,
                    ObstructionKind::Overlay,
                ));
            }
        }

        regions
    }
}
