//! Telea 快速行进修复
//!
//! Masked pixels are filled in order of increasing distance from the mask
//! boundary. Each pixel becomes a weighted average of known pixels within
//! `radius`, weighted by direction along the distance-field gradient,
//! geometric distance and level-set proximity.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

#[derive(Debug, Clone, Copy)]
struct BandPixel {
    t: f32,
    idx: usize,
}

impl PartialEq for BandPixel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BandPixel {}

impl PartialOrd for BandPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BandPixel {
    // 反转，BinaryHeap 变为小顶堆
    fn cmp(&self, other: &Self) -> Ordering {
        other.t.total_cmp(&self.t).then_with(|| other.idx.cmp(&self.idx))
    }
}

/// 对 RGBA 缓冲区按掩码修复，alpha 通道保持不变
///
/// `mask[i] == true` marks pixel `i` for reconstruction. Pixels with no
/// known neighbour anywhere (a fully masked frame) are left untouched.
pub fn inpaint_telea(rgba: &mut [u8], mask: &[bool], width: u32, height: u32, radius: u32) {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || rgba.len() < w * h * 4 || mask.len() < w * h {
        return;
    }

    let mut flags = vec![KNOWN; w * h];
    let mut dist = vec![0f32; w * h];
    let mut heap = BinaryHeap::new();

    for (i, &masked) in mask.iter().enumerate().take(w * h) {
        if masked {
            flags[i] = INSIDE;
            dist[i] = f32::MAX;
        }
    }

    // 初始窄带：与掩码相邻的已知像素
    for i in 0..w * h {
        if flags[i] != KNOWN {
            continue;
        }
        let x = i % w;
        let y = i / w;
        if neighbors4(x, y, w, h).any(|n| flags[n] == INSIDE) {
            flags[i] = BAND;
            heap.push(BandPixel { t: 0.0, idx: i });
        }
    }

    let radius = radius.max(1) as isize;

    while let Some(BandPixel { idx, .. }) = heap.pop() {
        if flags[idx] == KNOWN {
            continue;
        }
        flags[idx] = KNOWN;
        let x = idx % w;
        let y = idx / w;

        let neighbours: Vec<usize> = neighbors4(x, y, w, h).collect();
        for n in neighbours {
            if flags[n] != INSIDE {
                continue;
            }
            let nx = n % w;
            let ny = n / w;

            let t = [
                solve_eikonal(nx, ny, -1, -1, &flags, &dist, w, h),
                solve_eikonal(nx, ny, 1, -1, &flags, &dist, w, h),
                solve_eikonal(nx, ny, -1, 1, &flags, &dist, w, h),
                solve_eikonal(nx, ny, 1, 1, &flags, &dist, w, h),
            ]
            .into_iter()
            .fold(f32::MAX, f32::min);
            dist[n] = t;

            fill_pixel(rgba, &flags, &dist, nx, ny, w, h, radius);

            flags[n] = BAND;
            heap.push(BandPixel { t, idx: n });
        }
    }
}

fn neighbors4(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = usize> {
    let mut out = [usize::MAX; 4];
    if x > 0 {
        out[0] = y * w + x - 1;
    }
    if x + 1 < w {
        out[1] = y * w + x + 1;
    }
    if y > 0 {
        out[2] = (y - 1) * w + x;
    }
    if y + 1 < h {
        out[3] = (y + 1) * w + x;
    }
    out.into_iter().filter(|&n| n != usize::MAX)
}

/// 用水平邻居 (x+dx, y) 与垂直邻居 (x, y+dy) 求解 |∇T| = 1
#[allow(clippy::too_many_arguments)]
fn solve_eikonal(x: usize, y: usize, dx: isize, dy: isize, flags: &[u8], dist: &[f32], w: usize, h: usize) -> f32 {
    let ax = x as isize + dx;
    let by = y as isize + dy;
    let a = if ax >= 0 && (ax as usize) < w { Some(y * w + ax as usize) } else { None };
    let b = if by >= 0 && (by as usize) < h { Some(by as usize * w + x) } else { None };

    let known = |i: Option<usize>| i.filter(|&i| flags[i] != INSIDE).map(|i| dist[i]);
    match (known(a), known(b)) {
        (Some(t1), Some(t2)) => {
            let r = 2.0 - (t1 - t2) * (t1 - t2);
            if r > 0.0 {
                let s = r.sqrt();
                let mut sol = (t1 + t2 - s) / 2.0;
                if sol < t1 || sol < t2 {
                    sol = (t1 + t2 + s) / 2.0;
                }
                if sol >= t1 && sol >= t2 {
                    return sol;
                }
            }
            1.0 + t1.min(t2)
        }
        (Some(t), None) | (None, Some(t)) => 1.0 + t,
        (None, None) => f32::MAX,
    }
}

/// 距离场梯度（中心差分，仅用非 INSIDE 像素）
fn distance_gradient(flags: &[u8], dist: &[f32], x: usize, y: usize, w: usize, h: usize) -> (f32, f32) {
    let idx = y * w + x;
    let t = dist[idx];
    let usable = |i: usize| flags[i] != INSIDE;

    let gx = {
        let prev = (x > 0).then(|| idx - 1).filter(|&i| usable(i));
        let next = (x + 1 < w).then(|| idx + 1).filter(|&i| usable(i));
        match (prev, next) {
            (Some(p), Some(n)) => (dist[n] - dist[p]) * 0.5,
            (Some(p), None) => t - dist[p],
            (None, Some(n)) => dist[n] - t,
            (None, None) => 0.0,
        }
    };
    let gy = {
        let prev = (y > 0).then(|| idx - w).filter(|&i| usable(i));
        let next = (y + 1 < h).then(|| idx + w).filter(|&i| usable(i));
        match (prev, next) {
            (Some(p), Some(n)) => (dist[n] - dist[p]) * 0.5,
            (Some(p), None) => t - dist[p],
            (None, Some(n)) => dist[n] - t,
            (None, None) => 0.0,
        }
    };
    (gx, gy)
}

#[allow(clippy::too_many_arguments)]
fn fill_pixel(rgba: &mut [u8], flags: &[u8], dist: &[f32], x: usize, y: usize, w: usize, h: usize, radius: isize) {
    let idx = y * w + x;
    let t = dist[idx];
    let (gx, gy) = distance_gradient(flags, dist, x, y, w, h);

    let mut acc = [0f32; 3];
    let mut total = 0f32;

    for oy in -radius..=radius {
        for ox in -radius..=radius {
            let kx = x as isize + ox;
            let ky = y as isize + oy;
            if kx < 0 || ky < 0 || kx as usize >= w || ky as usize >= h {
                continue;
            }
            let k = ky as usize * w + kx as usize;
            if flags[k] == INSIDE || k == idx {
                continue;
            }
            let rx = x as f32 - kx as f32;
            let ry = y as f32 - ky as f32;
            let len_sq = rx * rx + ry * ry;
            if len_sq > (radius * radius) as f32 {
                continue;
            }
            let len = len_sq.sqrt();

            let mut direction = (rx * gx + ry * gy).abs() / len;
            if direction <= 1e-6 {
                direction = 1e-6;
            }
            let distance = 1.0 / len_sq;
            let level = 1.0 / (1.0 + (dist[k] - t).abs());
            let weight = direction * distance * level;

            for c in 0..3 {
                acc[c] += weight * rgba[k * 4 + c] as f32;
            }
            total += weight;
        }
    }

    if total > 0.0 {
        for c in 0..3 {
            rgba[idx * 4 + c] = (acc[c] / total).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: usize, h: usize, v: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(w * h * 4);
        for _ in 0..w * h {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        data
    }

    fn rect_mask(w: usize, h: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<bool> {
        (0..w * h)
            .map(|i| {
                let (x, y) = (i % w, i / w);
                x >= x0 && x < x1 && y >= y0 && y < y1
            })
            .collect()
    }

    #[test]
    fn test_fills_hole_in_solid_background() {
        let (w, h) = (40, 30);
        let mut data = solid(w, h, 90);
        let mask = rect_mask(w, h, 10, 10, 25, 20);
        for (i, &m) in mask.iter().enumerate() {
            if m {
                data[i * 4] = 255;
                data[i * 4 + 1] = 0;
                data[i * 4 + 2] = 0;
            }
        }

        inpaint_telea(&mut data, &mask, w as u32, h as u32, 3);

        for px in data.chunks_exact(4) {
            assert_eq!(&px[..3], &[90, 90, 90]);
        }
    }

    #[test]
    fn test_unmasked_pixels_unchanged() {
        let (w, h) = (20, 20);
        let mut data: Vec<u8> = (0..w * h).flat_map(|i| [(i % 251) as u8, 10, 20, 255]).collect();
        let original = data.clone();
        let mask = rect_mask(w, h, 5, 5, 10, 10);

        inpaint_telea(&mut data, &mask, w as u32, h as u32, 3);

        for (i, &m) in mask.iter().enumerate() {
            if !m {
                assert_eq!(&data[i * 4..i * 4 + 4], &original[i * 4..i * 4 + 4]);
            }
        }
    }

    #[test]
    fn test_vertical_split_is_continued() {
        // 左黑右白，中间挖洞：修复后左侧偏暗、右侧偏亮
        let (w, h) = (40, 40);
        let mut data: Vec<u8> = (0..w * h)
            .flat_map(|i| {
                let v = if i % w < 20 { 30 } else { 220 };
                [v, v, v, 255]
            })
            .collect();
        let mask = rect_mask(w, h, 12, 12, 28, 28);
        inpaint_telea(&mut data, &mask, w as u32, h as u32, 3);

        let left = data[(20 * w + 13) * 4];
        let right = data[(20 * w + 26) * 4];
        assert!(left < right);
    }

    #[test]
    fn test_fully_masked_frame_left_alone() {
        let (w, h) = (8, 8);
        let mut data = solid(w, h, 77);
        let mask = vec![true; w * h];
        inpaint_telea(&mut data, &mask, w as u32, h as u32, 3);
        assert!(data.chunks_exact(4).all(|p| p[0] == 77));
    }
}
