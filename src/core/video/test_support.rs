//! 测试用合成帧

use super::frame::Frame;

/// A synthetic "slide": an 8x8 grid of dark/light blocks chosen by a seeded
/// LCG, overlaid with a one-pixel checker so the frame is sharp. Different
/// seeds give visually distinct slides; the same seed gives identical pixels.
pub fn slide_frame(seed: u64, width: u32, height: u32, secs: f64) -> Frame {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut blocks = [0u8; 64];
    for block in blocks.iter_mut() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *block = if (state >> 33) & 1 == 1 { 210 } else { 40 };
    }

    let block_w = (width / 8).max(1);
    let block_h = (height / 8).max(1);
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let bx = (x / block_w).min(7) as usize;
            let by = (y / block_h).min(7) as usize;
            let base = blocks[by * 8 + bx] as i32;
            let texture = if (x + y) % 2 == 0 { 15 } else { -15 };
            let v = (base + texture).clamp(0, 255) as u8;
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    Frame::at_secs(width, height, data, secs, (secs * 1000.0) as u64)
}

pub fn uniform_frame(width: u32, height: u32, value: u8, secs: f64) -> Frame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        data.extend_from_slice(&[value, value, value, 255]);
    }
    Frame::at_secs(width, height, data, secs, 0)
}

pub fn sequence(seeds_and_times: &[(u64, f64)]) -> Vec<Frame> {
    seeds_and_times
        .iter()
        .map(|&(seed, secs)| slide_frame(seed, 320, 240, secs))
        .collect()
}
