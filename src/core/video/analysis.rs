//! 灰度图像分析：清晰度与边缘密度

/// 3x3 拉普拉斯算子响应的方差（越低越模糊）
///
/// Border pixels are skipped; frames narrower than 3 pixels report 0.
pub fn laplacian_variance(gray: &[u8], width: u32, height: u32) -> f64 {
    let w = width as usize;
    let h = height as usize;
    if w < 3 || h < 3 || gray.len() < w * h {
        return 0.0;
    }

    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut count = 0usize;

    for y in 1..h - 1 {
        let row = y * w;
        for x in 1..w - 1 {
            let idx = row + x;
            let response = gray[idx - 1] as i32
                + gray[idx + 1] as i32
                + gray[idx - w] as i32
                + gray[idx + w] as i32
                - 4 * gray[idx] as i32;
            let r = response as f64;
            sum += r;
            sum_sq += r * r;
            count += 1;
        }
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Canny 边缘像素占比
///
/// Sobel gradients with L1 magnitude, non-maximum suppression along the
/// quantised gradient direction, then hysteresis between `low` and `high`.
pub fn canny_edge_density(gray: &[u8], width: u32, height: u32, low: f32, high: f32) -> f32 {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || gray.len() < w * h {
        return 0.0;
    }
    let edges = canny(gray, w, h, low, high);
    let count = edges.iter().filter(|&&e| e).count();
    count as f32 / (w * h) as f32
}

fn canny(gray: &[u8], w: usize, h: usize, low: f32, high: f32) -> Vec<bool> {
    let mut magnitude = vec![0f32; w * h];
    let mut direction = vec![0u8; w * h];

    if w < 3 || h < 3 {
        return vec![false; w * h];
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: isize, dy: isize| -> i32 {
                gray[(y as isize + dy) as usize * w + (x as isize + dx) as usize] as i32
            };
            let gx = (p(1, -1) + 2 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2 * p(-1, 0) + p(-1, 1));
            let gy = (p(-1, 1) + 2 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2 * p(0, -1) + p(1, -1));
            let idx = y * w + x;
            magnitude[idx] = (gx.abs() + gy.abs()) as f32;
            direction[idx] = quantize_direction(gx as f32, gy as f32);
        }
    }

    // 非极大值抑制
    let mut strength = vec![0u8; w * h]; // 0 无, 1 弱, 2 强
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }
            let (a, b) = match direction[idx] {
                0 => (idx - 1, idx + 1),
                1 => (idx - w + 1, idx + w - 1),
                2 => (idx - w, idx + w),
                _ => (idx - w - 1, idx + w + 1),
            };
            if m > magnitude[a] && m >= magnitude[b] {
                strength[idx] = if m > high { 2 } else { 1 };
            }
        }
    }

    // 滞后阈值：从强边缘出发连通弱边缘
    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = strength
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s == 2)
        .map(|(i, _)| i)
        .collect();
    for &i in &stack {
        edges[i] = true;
    }
    while let Some(idx) = stack.pop() {
        let x = idx % w;
        let y = idx / w;
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if !edges[n] && strength[n] == 1 {
                    edges[n] = true;
                    stack.push(n);
                }
            }
        }
    }

    edges
}

/// 0: 水平梯度, 1: 45°, 2: 垂直, 3: 135°
fn quantize_direction(gx: f32, gy: f32) -> u8 {
    let angle = gy.atan2(gx).to_degrees();
    let angle = if angle < 0.0 { angle + 180.0 } else { angle };
    if !(22.5..157.5).contains(&angle) {
        0
    } else if angle < 67.5 {
        1
    } else if angle < 112.5 {
        2
    } else {
        3
    }
}
