pub mod analysis;
pub mod deduplicator;
pub mod enhance;
pub mod error;
pub mod fingerprint;
pub mod frame;
pub mod obstruction;
pub mod quality;
pub mod segmenter;

#[cfg(test)]
pub(crate) mod test_support;

pub use deduplicator::{DedupConfig, SlideDeduplicator};
pub use enhance::{enhance_for_ocr, EnhanceConfig};
pub use error::VideoError;
pub use fingerprint::{fingerprint_distance, PerceptualFingerprint};
pub use frame::Frame;
pub use obstruction::{
    CleaningOutcome, DetectorConfig, ObstructionDetector, ObstructionKind, ObstructionRegion, ObstructionRemover,
    RemoverConfig,
};
pub use quality::{FrameQualityGate, QualityConfig, QualityVerdict};
pub use segmenter::{PageSegmenter, SegmentationConfig};
