use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstructionKind {
    /// 讲者人脸/摄像头画面
    Face,
    /// 水印、台标、社交账号等叠加层
    Overlay,
}

/// 帧内遮挡区域（轴对齐矩形）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstructionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
    pub kind: ObstructionKind,
}

impl ObstructionRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32, confidence: f32, kind: ObstructionKind) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: confidence.clamp(0.0, 1.0),
            kind,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &ObstructionRegion) -> bool {
        !(self.right() < other.x
            || other.right() < self.x
            || self.bottom() < other.y
            || other.bottom() < self.y)
    }

    pub fn union(&self, other: &ObstructionRegion) -> ObstructionRegion {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        ObstructionRegion {
            x,
            y,
            width: right - x,
            height: bottom - y,
            confidence: self.confidence.max(other.confidence),
            kind: if self.confidence > other.confidence {
                self.kind
            } else {
                other.kind
            },
        }
    }

    /// Clips the rectangle to a `width` x `height` frame. `None` if nothing remains.
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<ObstructionRegion> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(ObstructionRegion {
            width: w,
            height: h,
            ..*self
        })
    }
}

/// 合并重叠区域
///
/// Regions are sorted by `x` and swept left to right; each region that
/// intersects the running box is folded into it. A union can grow into a box
/// emitted earlier in the same sweep, so sweeps repeat until one makes no merge.
pub fn merge_overlapping(regions: Vec<ObstructionRegion>) -> Vec<ObstructionRegion> {
    let mut merged = regions;
    loop {
        if merged.len() <= 1 {
            return merged;
        }
        let before = merged.len();
        merged = sweep(merged);
        if merged.len() == before {
            return merged;
        }
    }
}

fn sweep(mut regions: Vec<ObstructionRegion>) -> Vec<ObstructionRegion> {
    regions.sort_by_key(|r| r.x);

    let mut merged = Vec::with_capacity(regions.len());
    let mut iter = regions.into_iter();
    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        if current.intersects(&next) {
            current = current.union(&next);
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}
