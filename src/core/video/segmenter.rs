//! 页面切分状态机
//!
//! Groups an ordered frame sequence into runs of the same slide and emits one
//! representative frame per run that stayed on screen long enough.
//!
//! Each frame is compared against the fingerprint of the last *confirmed*
//! page, not against the previous frame. A transient that gets dropped does
//! not move that reference, so frames after it that differ from the reference
//! keep restarting the candidate until something close to the reference shows
//! up again.

use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::fingerprint::PerceptualFingerprint;
use super::frame::{secs_to_duration, Frame};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// 汉明距离 ≤ 该值视为同一页
    pub hash_threshold: u32,
    /// 一页至少停留的秒数
    pub min_page_duration: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            hash_threshold: 10,
            min_page_duration: 2.0,
        }
    }
}

impl SegmentationConfig {
    /// 讲座：翻页慢，讲者走动多
    pub fn for_lectures() -> Self {
        Self {
            hash_threshold: 12,
            min_page_duration: 4.0,
        }
    }

    /// 快速翻页的演示
    pub fn for_fast_slides() -> Self {
        Self {
            hash_threshold: 8,
            min_page_duration: 1.0,
        }
    }

    fn min_dwell(&self) -> Duration {
        secs_to_duration(self.min_page_duration)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentState {
    NoCandidate,
    TrackingCandidate {
        /// 当前候选帧在输入中的下标
        candidate: usize,
        start: Duration,
        confirmed: PerceptualFingerprint,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentAction {
    /// 开始跟踪第一个候选
    Start,
    /// 同一页，候选换成当前帧
    Extend,
    /// 上一候选停留够久，输出
    Emit(usize),
    /// 上一候选停留太短，丢弃
    Drop(usize),
}

impl SegmentState {
    pub fn new() -> Self {
        SegmentState::NoCandidate
    }

    pub fn transition(
        &self,
        index: usize,
        timestamp: Duration,
        fingerprint: PerceptualFingerprint,
        config: &SegmentationConfig,
    ) -> (SegmentState, SegmentAction) {
        match self {
            SegmentState::NoCandidate => (
                SegmentState::TrackingCandidate {
                    candidate: index,
                    start: timestamp,
                    confirmed: fingerprint,
                },
                SegmentAction::Start,
            ),

            SegmentState::TrackingCandidate {
                candidate,
                start,
                confirmed,
            } => {
                if fingerprint.distance(confirmed) <= config.hash_threshold {
                    return (
                        SegmentState::TrackingCandidate {
                            candidate: index,
                            start: *start,
                            confirmed: *confirmed,
                        },
                        SegmentAction::Extend,
                    );
                }

                if timestamp.saturating_sub(*start) >= config.min_dwell() {
                    (
                        SegmentState::TrackingCandidate {
                            candidate: index,
                            start: timestamp,
                            confirmed: fingerprint,
                        },
                        SegmentAction::Emit(*candidate),
                    )
                } else {
                    (
                        SegmentState::TrackingCandidate {
                            candidate: index,
                            start: timestamp,
                            confirmed: *confirmed,
                        },
                        SegmentAction::Drop(*candidate),
                    )
                }
            }
        }
    }

    /// 输入结束时待输出的候选
    pub fn finish(&self, last_timestamp: Duration, config: &SegmentationConfig) -> Option<usize> {
        match self {
            SegmentState::NoCandidate => None,
            SegmentState::TrackingCandidate { candidate, start, .. } => {
                (last_timestamp.saturating_sub(*start) >= config.min_dwell()).then_some(*candidate)
            }
        }
    }
}

impl Default for SegmentState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageSegmenter {
    config: SegmentationConfig,
}

impl PageSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// 按时间顺序切分页面，返回每页的代表帧
    pub fn segment(&self, frames: &[Frame]) -> Vec<Frame> {
        if frames.is_empty() {
            debug!("📭 segment: empty input");
            return Vec::new();
        }
        if let Some(pos) = frames.windows(2).position(|w| w[1].timestamp < w[0].timestamp) {
            warn!(
                "⚠️ segment: timestamps go backwards at frame #{} ({:.3}s < {:.3}s), no pages produced",
                frames[pos + 1].frame_number,
                frames[pos + 1].timestamp_secs(),
                frames[pos].timestamp_secs()
            );
            return Vec::new();
        }

        // 指纹可并行计算，状态机必须顺序推进
        let fingerprints: Vec<Option<PerceptualFingerprint>> =
            frames.par_iter().map(PerceptualFingerprint::from_frame).collect();

        let mut state = SegmentState::new();
        let mut pages = Vec::new();
        let mut last_timestamp = None;

        for (index, (frame, fingerprint)) in frames.iter().zip(fingerprints).enumerate() {
            let Some(fingerprint) = fingerprint else {
                debug!("⏭️ segment: skipping malformed frame #{}", frame.frame_number);
                continue;
            };
            last_timestamp = Some(frame.timestamp);

            let (next, action) = state.transition(index, frame.timestamp, fingerprint, &self.config);
            match action {
                SegmentAction::Emit(page) => {
                    debug!("📄 page at {:.2}s (frame #{})", frames[page].timestamp_secs(), frames[page].frame_number);
                    pages.push(frames[page].clone());
                }
                SegmentAction::Drop(page) => {
                    debug!("💨 transient frame #{} dropped", frames[page].frame_number);
                }
                SegmentAction::Start | SegmentAction::Extend => {}
            }
            state = next;
        }

        if let Some(page) = last_timestamp.and_then(|ts| state.finish(ts, &self.config)) {
            pages.push(frames[page].clone());
        }

        info!("📑 segment: {} frames → {} pages", frames.len(), pages.len());
        pages
    }
}
