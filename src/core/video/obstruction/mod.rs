//! 遮挡检测与去除

pub mod cascade;
mod cascade_xml;
pub mod detector;
pub mod inpaint;
pub mod region;
pub mod remover;

pub use cascade::{CascadeParams, DetectionBox, HaarCascade};
pub use detector::{CascadeFaceDetector, DetectorConfig, FaceDetector, MockFaceDetector, ObstructionDetector, OverlayProbe};
pub use region::{merge_overlapping, ObstructionKind, ObstructionRegion};
pub use remover::{CleaningOutcome, ObstructionRemover, RemoverConfig};
