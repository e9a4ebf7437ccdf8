use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::fingerprint::PerceptualFingerprint;
use super::frame::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 汉明距离 ≤ 该值视为重复，比切分阈值更严格
    pub similarity_threshold: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 5,
        }
    }
}

/// 全局近重复过滤
///
/// Greedy: every frame is compared to all frames accepted so far, not only
/// the previous one, so a slide revisited later in the talk is dropped too.
#[derive(Debug, Clone, Default)]
pub struct SlideDeduplicator {
    config: DedupConfig,
}

impl SlideDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(similarity_threshold: u32) -> Self {
        Self {
            config: DedupConfig { similarity_threshold },
        }
    }

    pub fn with_config(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn is_duplicate(&self, fingerprint: &PerceptualFingerprint, accepted: &[PerceptualFingerprint]) -> bool {
        accepted
            .iter()
            .any(|prev| fingerprint.distance(prev) <= self.config.similarity_threshold)
    }

    /// 保序去重；指纹不可计算的帧原样保留
    pub fn deduplicate(&self, frames: &[Frame]) -> Vec<Frame> {
        let fingerprints: Vec<Option<PerceptualFingerprint>> =
            frames.par_iter().map(PerceptualFingerprint::from_frame).collect();

        let mut accepted: Vec<PerceptualFingerprint> = Vec::with_capacity(frames.len());
        let mut kept = Vec::with_capacity(frames.len());

        for (frame, fingerprint) in frames.iter().zip(fingerprints) {
            match fingerprint {
                Some(fp) if self.is_duplicate(&fp, &accepted) => {
                    debug!("🔁 frame #{} is a near-duplicate, dropped", frame.frame_number);
                }
                Some(fp) => {
                    accepted.push(fp);
                    kept.push(frame.clone());
                }
                None => kept.push(frame.clone()),
            }
        }

        info!("🧮 dedup: {} → {} frames", frames.len(), kept.len());
        kept
    }
}
