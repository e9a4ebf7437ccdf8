use image::imageops;
use image::RgbaImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::inpaint::inpaint_telea;
use super::region::ObstructionRegion;
use crate::core::video::frame::{luma_of, Frame};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoverConfig {
    pub inpaint_radius: u32,
    /// 保守策略取背景色时的外扩像素
    pub border_padding: u32,
    /// 高斯模糊 sigma（对应 15x15 核）
    pub blend_sigma: f32,
    pub black_level: u8,
    pub white_level: u8,
    /// 近纯黑/纯白像素占比上限
    pub max_extreme_ratio: f64,
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            inpaint_radius: 3,
            border_padding: 20,
            blend_sigma: 2.6,
            black_level: 10,
            white_level: 245,
            max_extreme_ratio: 0.8,
        }
    }
}

/// Which strategy produced the returned frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningOutcome {
    /// 没有区域，原样返回
    Untouched,
    Inpainted,
    Fallback,
    /// 两种策略都失败，返回原帧
    Reverted,
}

#[derive(Debug, Clone, Default)]
pub struct ObstructionRemover {
    config: RemoverConfig,
}

impl ObstructionRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RemoverConfig) -> Self {
        Self { config }
    }

    pub fn remove_obstructions(&self, frame: &Frame, regions: &[ObstructionRegion]) -> Frame {
        self.clean(frame, regions).0
    }

    /// 主策略 → 自检 → 保守策略 → 自检 → 原帧
    pub fn clean(&self, frame: &Frame, regions: &[ObstructionRegion]) -> (Frame, CleaningOutcome) {
        let regions: Vec<ObstructionRegion> = regions
            .iter()
            .filter_map(|r| r.clamped_to(frame.width, frame.height))
            .collect();
        if regions.is_empty() || !frame.is_well_formed() {
            return (frame.clone(), CleaningOutcome::Untouched);
        }

        let inpainted = self.inpaint(frame, &regions);
        if self.is_valid_cleaned_frame(&inpainted) {
            return (inpainted, CleaningOutcome::Inpainted);
        }
        debug!("⚠️ frame #{}: inpainting collapsed, trying fallback", frame.frame_number);

        if let Some(filled) = self.conservative_clean(frame, &regions) {
            if self.is_valid_cleaned_frame(&filled) {
                return (filled, CleaningOutcome::Fallback);
            }
        }

        warn!("⚠️ frame #{}: cleaning failed, keeping original", frame.frame_number);
        (frame.clone(), CleaningOutcome::Reverted)
    }

    /// 超过 80% 像素接近纯黑或纯白即视为修复崩坏
    pub fn is_valid_cleaned_frame(&self, frame: &Frame) -> bool {
        if frame.is_empty() || !frame.is_well_formed() {
            return false;
        }
        let extreme = frame
            .data
            .chunks_exact(4)
            .map(|p| luma_of(p[0], p[1], p[2]))
            .filter(|&l| l < self.config.black_level || l > self.config.white_level)
            .count();
        (extreme as f64 / frame.pixel_count() as f64) <= self.config.max_extreme_ratio
    }

    fn inpaint(&self, frame: &Frame, regions: &[ObstructionRegion]) -> Frame {
        let mut data = frame.data.clone();
        let width = frame.width as usize;
        for region in regions {
            let mut mask = vec![false; frame.pixel_count()];
            for y in region.y..region.bottom() {
                let row = y as usize * width;
                mask[row + region.x as usize..row + region.right() as usize].fill(true);
            }
            inpaint_telea(&mut data, &mask, frame.width, frame.height, self.config.inpaint_radius);
        }
        frame.with_data(data)
    }

    /// 用周边均色填充后局部模糊
    fn conservative_clean(&self, frame: &Frame, regions: &[ObstructionRegion]) -> Option<Frame> {
        let original = frame.to_image()?;
        let mut cleaned = original.clone();

        for region in regions {
            let fill = border_mean(&original, region, self.config.border_padding);
            for y in region.y..region.bottom() {
                for x in region.x..region.right() {
                    let px = cleaned.get_pixel_mut(x, y);
                    px.0[..3].copy_from_slice(&fill);
                }
            }

            // 只模糊填充区域，区域外像素保持不变
            let window = imageops::crop_imm(&cleaned, region.x, region.y, region.width, region.height).to_image();
            let blurred = imageops::blur(&window, self.config.blend_sigma);
            for (x, y, px) in blurred.enumerate_pixels() {
                cleaned.put_pixel(region.x + x, region.y + y, *px);
            }
        }

        Some(Frame::from_image(cleaned, frame.timestamp, frame.frame_number))
    }
}

/// 区域外扩 `padding` 的环形边框均色；区域铺满全帧时退化为整窗均色
fn border_mean(image: &RgbaImage, region: &ObstructionRegion, padding: u32) -> [u8; 3] {
    let (w, h) = image.dimensions();
    let x0 = region.x.saturating_sub(padding);
    let y0 = region.y.saturating_sub(padding);
    let x1 = (region.right() + padding).min(w);
    let y1 = (region.bottom() + padding).min(h);

    let mut ring = [0u64; 3];
    let mut ring_count = 0u64;
    let mut all = [0u64; 3];
    let mut all_count = 0u64;

    for y in y0..y1 {
        for x in x0..x1 {
            let p = image.get_pixel(x, y).0;
            let inside = x >= region.x && x < region.right() && y >= region.y && y < region.bottom();
            for c in 0..3 {
                all[c] += p[c] as u64;
                if !inside {
                    ring[c] += p[c] as u64;
                }
            }
            all_count += 1;
            if !inside {
                ring_count += 1;
            }
        }
    }

    let (sums, count) = if ring_count > 0 { (ring, ring_count) } else { (all, all_count.max(1)) };
    [
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ]
}
