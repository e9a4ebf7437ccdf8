//! Haar 级联分类器（Viola-Jones）
//!
//! The model is a classic stump-based cascade: a base detection window,
//! and a list of stages each holding weak classifiers over weighted
//! rectangles. It loads from a JSON rendering of that shape or from an
//! OpenCV `haarcascade_*.xml` file. Models are supplied by the caller;
//! nothing is bundled.

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::video::error::VideoError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<CascadeStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeStage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakClassifier {
    pub rects: Vec<WeightedRect>,
    /// Compared against the window-normalised feature value.
    pub threshold: f32,
    pub left_value: f32,
    pub right_value: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

/// 多尺度扫描参数（对应 scaleFactor / minNeighbors / minSize）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    pub scale_factor: f32,
    pub min_neighbors: usize,
    pub min_size: u32,
    /// Relative tolerance used when grouping raw hits.
    pub group_eps: f32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: 30,
            group_eps: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl HaarCascade {
    pub fn from_json(json: &str) -> Result<Self, VideoError> {
        let cascade: HaarCascade = serde_json::from_str(json)?;
        cascade.validate()?;
        Ok(cascade)
    }

    /// `.xml` 按 OpenCV 格式读取，其余按 JSON
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if is_xml {
            Self::from_opencv_xml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), VideoError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(VideoError::InvalidCascade("detection window must be non-empty".into()));
        }
        if self.stages.is_empty() {
            return Err(VideoError::InvalidCascade("cascade has no stages".into()));
        }
        for stage in &self.stages {
            for classifier in &stage.classifiers {
                for r in &classifier.rects {
                    if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                        return Err(VideoError::InvalidCascade(format!(
                            "feature rect ({}, {}, {}, {}) exceeds {}x{} window",
                            r.x, r.y, r.width, r.height, self.window_width, self.window_height
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// 在灰度图上多尺度滑窗检测，返回分组后的检测框
    pub fn detect(&self, gray: &[u8], width: u32, height: u32, params: &CascadeParams) -> Vec<DetectionBox> {
        let w = width as usize;
        let h = height as usize;
        if w == 0 || h == 0 || gray.len() < w * h {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray, w, h);
        let mut hits = Vec::new();

        let min_scale = (params.min_size as f32 / self.window_width.min(self.window_height) as f32).max(1.0);
        let mut scale = min_scale;
        let scale_step = params.scale_factor.max(1.01);

        loop {
            let win_w = (self.window_width as f32 * scale).round() as usize;
            let win_h = (self.window_height as f32 * scale).round() as usize;
            if win_w > w || win_h > h {
                break;
            }

            let step = ((scale * 2.0) as usize).clamp(1, 8);
            let mut y = 0;
            while y + win_h <= h {
                let mut x = 0;
                while x + win_w <= w {
                    if self.evaluate_window(&integral, x, y, win_w, win_h, scale) {
                        hits.push(DetectionBox {
                            x: x as u32,
                            y: y as u32,
                            width: win_w as u32,
                            height: win_h as u32,
                        });
                    }
                    x += step;
                }
                y += step;
            }

            scale *= scale_step;
        }

        debug!("🔎 cascade raw hits: {}", hits.len());
        group_rectangles(&hits, params.min_neighbors, params.group_eps)
    }

    fn evaluate_window(&self, integral: &IntegralImage, x: usize, y: usize, win_w: usize, win_h: usize, scale: f32) -> bool {
        let area = (win_w * win_h) as f64;
        let sum = integral.sum(x, y, win_w, win_h) as f64;
        let sq_sum = integral.sq_sum(x, y, win_w, win_h) as f64;
        let mean = sum / area;
        let variance = sq_sum / area - mean * mean;
        let std_dev = if variance > 1.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut stage_sum = 0f32;
            for classifier in &stage.classifiers {
                let mut feature = 0f64;
                for r in &classifier.rects {
                    let rx = x + (r.x as f32 * scale) as usize;
                    let ry = y + (r.y as f32 * scale) as usize;
                    let rw = ((r.width as f32 * scale) as usize).min(x + win_w - rx);
                    let rh = ((r.height as f32 * scale) as usize).min(y + win_h - ry);
                    feature += r.weight as f64 * integral.sum(rx, ry, rw, rh) as f64;
                }
                let normalized = feature / area;
                stage_sum += if normalized < classifier.threshold as f64 * std_dev {
                    classifier.left_value
                } else {
                    classifier.right_value
                };
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }
}

/// 积分图 + 平方积分图，(w+1)x(h+1)
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &[u8], w: usize, h: usize) -> Self {
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = gray[y * w + x] as u64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq_sum }
    }

    fn rect(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let a = table[y * stride + x];
        let b = table[y * stride + x + w];
        let c = table[(y + h) * stride + x];
        let d = table[(y + h) * stride + x + w];
        d + a - b - c
    }

    fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }
}

fn similar(a: &DetectionBox, b: &DetectionBox, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

/// 聚类原始命中框，邻居数不足的簇丢弃，其余取平均框
fn group_rectangles(hits: &[DetectionBox], min_neighbors: usize, eps: f32) -> Vec<DetectionBox> {
    let n = hits.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = i;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&hits[i], &hits[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut clusters: std::collections::BTreeMap<usize, Vec<&DetectionBox>> = std::collections::BTreeMap::new();
    for (i, hit) in hits.iter().enumerate() {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(hit);
    }

    clusters
        .into_values()
        .filter(|members| members.len() >= min_neighbors.max(1))
        .map(|members| {
            let count = members.len() as u64;
            let avg = |f: fn(&DetectionBox) -> u32| {
                (members.iter().map(|b| f(b) as u64).sum::<u64>() / count) as u32
            };
            DetectionBox {
                x: avg(|b| b.x),
                y: avg(|b| b.y),
                width: avg(|b| b.width),
                height: avg(|b| b.height),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 单级单特征：下半亮、上半暗
    fn edge_cascade() -> HaarCascade {
        HaarCascade::from_json(
            r#"{
                "window_width": 8,
                "window_height": 8,
                "stages": [{
                    "threshold": 0.5,
                    "classifiers": [{
                        "rects": [
                            {"x": 0, "y": 0, "width": 8, "height": 8, "weight": -1.0},
                            {"x": 0, "y": 4, "width": 8, "height": 4, "weight": 2.0}
                        ],
                        "threshold": 0.2,
                        "left_value": 0.0,
                        "right_value": 1.0
                    }]
                }]
            }"#,
        )
        .unwrap()
    }

    fn pattern_image(w: usize, h: usize) -> Vec<u8> {
        let mut gray = vec![128u8; w * h];
        for y in 20..44 {
            for x in 20..44 {
                gray[y * w + x] = if y < 32 { 0 } else { 255 };
            }
        }
        gray
    }

    fn params() -> CascadeParams {
        CascadeParams {
            min_neighbors: 1,
            min_size: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_pattern() {
        let cascade = edge_cascade();
        let gray = pattern_image(64, 64);
        let boxes = cascade.detect(&gray, 64, 64, &params());
        assert!(!boxes.is_empty());
        assert!(boxes.iter().any(|b| b.x < 44 && b.x + b.width > 20 && b.y < 44 && b.y + b.height > 20));
    }

    #[test]
    fn test_flat_image_has_no_detections() {
        let cascade = edge_cascade();
        let gray = vec![128u8; 64 * 64];
        assert!(cascade.detect(&gray, 64, 64, &params()).is_empty());
    }

    #[test]
    fn test_rejects_feature_outside_window() {
        let json = r#"{
            "window_width": 4, "window_height": 4,
            "stages": [{"threshold": 0.0, "classifiers": [{
                "rects": [{"x": 2, "y": 0, "width": 4, "height": 4, "weight": 1.0}],
                "threshold": 0.0, "left_value": 0.0, "right_value": 1.0
            }]}]
        }"#;
        assert!(matches!(HaarCascade::from_json(json), Err(VideoError::InvalidCascade(_))));
    }

    #[test]
    fn test_grouping_drops_sparse_clusters() {
        let hits = vec![
            DetectionBox { x: 10, y: 10, width: 20, height: 20 },
            DetectionBox { x: 11, y: 10, width: 20, height: 20 },
            DetectionBox { x: 12, y: 11, width: 20, height: 20 },
            DetectionBox { x: 100, y: 100, width: 20, height: 20 },
        ];
        let grouped = group_rectangles(&hits, 3, 0.2);
        assert_eq!(grouped, vec![DetectionBox { x: 11, y: 10, width: 20, height: 20 }]);
    }
}
