use image::imageops::{self, FilterType};
use image::GrayImage;
use rustdct::DctPlanner;

use super::frame::Frame;

/// 缩放尺寸，DCT 在该尺寸上计算
const SAMPLE_SIZE: usize = 32;
/// 保留的低频块边长，8x8 = 64 bit
const LOW_FREQ: usize = 8;
/// 低于该幅度的系数视为 0，避免均匀画面的浮点噪声翻转比特
const COEFF_EPSILON: f64 = 1e-6;

/// DCT 感知哈希
///
/// 64-bit perceptual hash of a frame's coarse structure. Visually equivalent
/// frames sit at a small Hamming distance from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualFingerprint(u64);

impl PerceptualFingerprint {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// `None` for frames whose pixel buffer does not match their dimensions.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        frame.to_gray_image().map(|gray| Self::from_gray(&gray))
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        let small = imageops::resize(gray, SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Triangle);
        let mut coeffs: Vec<f64> = small.into_raw().into_iter().map(f64::from).collect();

        dct_2d(&mut coeffs, SAMPLE_SIZE);

        let mut low = [0f64; LOW_FREQ * LOW_FREQ];
        for v in 0..LOW_FREQ {
            for u in 0..LOW_FREQ {
                let c = coeffs[v * SAMPLE_SIZE + u];
                low[v * LOW_FREQ + u] = if c.abs() < COEFF_EPSILON { 0.0 } else { c };
            }
        }

        let median = median(&low);
        let mut hash = 0u64;
        for (i, &c) in low.iter().enumerate() {
            if c > median {
                hash |= 1 << i;
            }
        }
        Self(hash)
    }

    pub fn distance(&self, other: &PerceptualFingerprint) -> u32 {
        hamming_distance(self.0, other.0)
    }
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Fingerprint distance between two frames; malformed frames are maximally distant.
pub fn fingerprint_distance(a: &Frame, b: &Frame) -> u32 {
    match (PerceptualFingerprint::from_frame(a), PerceptualFingerprint::from_frame(b)) {
        (Some(fa), Some(fb)) => fa.distance(&fb),
        _ => 64,
    }
}

/// 行列分离的二维 DCT-II
fn dct_2d(buffer: &mut [f64], size: usize) {
    let mut planner = DctPlanner::<f64>::new();
    let dct = planner.plan_dct2(size);

    for row in buffer.chunks_exact_mut(size) {
        dct.process_dct2(row);
    }

    let mut column = vec![0f64; size];
    for x in 0..size {
        for y in 0..size {
            column[y] = buffer[y * size + x];
        }
        dct.process_dct2(&mut column);
        for y in 0..size {
            buffer[y * size + x] = column[y];
        }
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
