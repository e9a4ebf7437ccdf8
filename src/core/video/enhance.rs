//! 识别前图像增强：去噪 → CLAHE → 自适应高斯阈值

use image::GrayImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// 3×3 中值滤波
    pub denoise: bool,
    /// CLAHE 直方图裁剪倍数，0 表示跳过对比度增强
    pub clip_limit: f32,
    /// CLAHE 分块数（每个方向）
    pub tile_grid: u32,
    /// 阈值邻域边长，奇数
    pub block_size: u32,
    /// 从邻域加权均值中减去的常数
    pub offset: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            denoise: true,
            clip_limit: 2.0,
            tile_grid: 8,
            block_size: 11,
            offset: 2.0,
        }
    }
}

/// 灰度图 → 黑白二值图（0 / 255）
pub fn enhance_for_ocr(gray: &GrayImage, config: &EnhanceConfig) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut pixels = gray.as_raw().clone();
    if config.denoise {
        pixels = median_3x3(&pixels, width, height);
    }
    if config.clip_limit > 0.0 {
        pixels = clahe(&pixels, width, height, config.clip_limit, config.tile_grid);
    }
    let binary = adaptive_threshold(&pixels, width, height, config.block_size, config.offset);
    GrayImage::from_raw(width, height, binary).unwrap_or_else(|| gray.clone())
}

/// 3×3 中值滤波，边缘复制
pub fn median_3x3(gray: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return gray.to_vec();
    }

    let mut out = vec![0u8; w * h];
    let mut window = [0u8; 9];
    for y in 0..h {
        for x in 0..w {
            let mut k = 0;
            for dy in -1isize..=1 {
                let ny = (y as isize + dy).clamp(0, h as isize - 1) as usize;
                for dx in -1isize..=1 {
                    let nx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                    window[k] = gray[ny * w + nx];
                    k += 1;
                }
            }
            window.sort_unstable();
            out[y * w + x] = window[4];
        }
    }
    out
}

/// 限制对比度的自适应直方图均衡
///
/// Each tile gets a clipped, redistributed histogram turned into a lookup
/// table; every pixel is mapped through the four nearest tile tables and
/// blended bilinearly so tile borders do not show.
pub fn clahe(gray: &[u8], width: u32, height: u32, clip_limit: f32, tile_grid: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return gray.to_vec();
    }
    let tiles_x = (tile_grid.max(1) as usize).min(w);
    let tiles_y = (tile_grid.max(1) as usize).min(h);

    let x_bounds: Vec<usize> = (0..=tiles_x).map(|i| i * w / tiles_x).collect();
    let y_bounds: Vec<usize> = (0..=tiles_y).map(|i| i * h / tiles_y).collect();

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0u32; 256];
            for y in y_bounds[ty]..y_bounds[ty + 1] {
                for &v in &gray[y * w + x_bounds[tx]..y * w + x_bounds[tx + 1]] {
                    hist[v as usize] += 1;
                }
            }
            let area = ((x_bounds[tx + 1] - x_bounds[tx]) * (y_bounds[ty + 1] - y_bounds[ty])) as u32;
            luts[ty * tiles_x + tx] = tile_lut(&mut hist, area, clip_limit);
        }
    }

    let tile_w = w as f32 / tiles_x as f32;
    let tile_h = h as f32 / tiles_y as f32;
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let (y0, y1, wy) = neighbours((y as f32 + 0.5) / tile_h - 0.5, tiles_y);
        for x in 0..w {
            let (x0, x1, wx) = neighbours((x as f32 + 0.5) / tile_w - 0.5, tiles_x);
            let v = gray[y * w + x] as usize;
            let top = luts[y0 * tiles_x + x0][v] as f32 * (1.0 - wx) + luts[y0 * tiles_x + x1][v] as f32 * wx;
            let bottom = luts[y1 * tiles_x + x0][v] as f32 * (1.0 - wx) + luts[y1 * tiles_x + x1][v] as f32 * wx;
            out[y * w + x] = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn tile_lut(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    // 超出部分均摊回所有灰度级，余数从低到高逐个补
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in hist.iter_mut().enumerate() {
        *count += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area as f32;
    let mut cdf = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// 分块坐标 → (左/上块, 右/下块, 右/下块权重)
fn neighbours(pos: f32, tiles: usize) -> (usize, usize, f32) {
    let last = tiles - 1;
    if pos <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = pos.floor() as usize;
    if lower >= last {
        return (last, last, 0.0);
    }
    (lower, lower + 1, pos - lower as f32)
}

/// 自适应高斯阈值：像素大于邻域高斯加权均值减 `offset` 时取 255
pub fn adaptive_threshold(gray: &[u8], width: u32, height: u32, block_size: u32, offset: f32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return gray.to_vec();
    }

    let size = (block_size.max(3) | 1) as usize;
    let kernel = gaussian_kernel(size);
    let radius = (size / 2) as isize;

    // 可分离卷积，边缘复制
    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let nx = (x as isize + k as isize - radius).clamp(0, w as isize - 1) as usize;
                acc += weight * gray[y * w + nx] as f32;
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let ny = (y as isize + k as isize - radius).clamp(0, h as isize - 1) as usize;
                acc += weight * horizontal[ny * w + x];
            }
            let mean = acc.round();
            out[y * w + x] = if gray[y * w + x] as f32 > mean - offset { 255 } else { 0 };
        }
    }
    out
}

/// 归一化高斯核，sigma 按窗口大小推算
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}
