//! 幻灯片提取流水线
//!
//! Quality gate, obstruction detection and removal run per frame on a rayon
//! pool; segmentation and dedup then fold over the cleaned sequence in order.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use super::assemble::{DocumentAssembler, TextReportAssembler};
use super::error::ExtractError;
use super::ocr::{recognize_pages, RecognizedPage, TextRecognizer};
use super::retry::RetryPolicy;
use crate::core::video::frame::secs_to_duration;
use crate::core::video::obstruction::FaceDetector;
use crate::core::video::{
    CleaningOutcome, DedupConfig, DetectorConfig, Frame, FrameQualityGate, ObstructionDetector, ObstructionRemover,
    PageSegmenter, QualityConfig, RemoverConfig, SegmentationConfig, SlideDeduplicator,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 采样间隔（秒）
    pub sample_interval_secs: f64,
    /// 0 表示按 CPU 核数
    pub worker_threads: usize,
    pub enable_cleaning: bool,
    pub enable_dedup: bool,
    pub quality: QualityConfig,
    pub detector: DetectorConfig,
    pub remover: RemoverConfig,
    pub segmentation: SegmentationConfig,
    pub dedup: DedupConfig,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 1.0,
            worker_threads: 0,
            enable_cleaning: true,
            enable_dedup: true,
            quality: QualityConfig::default(),
            detector: DetectorConfig::default(),
            remover: RemoverConfig::default(),
            segmentation: SegmentationConfig::default(),
            dedup: DedupConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// 讲座录像：2 秒采样，页面停留更久
    pub fn for_lectures() -> Self {
        Self {
            sample_interval_secs: 2.0,
            segmentation: SegmentationConfig::for_lectures(),
            ..Self::default()
        }
    }

    pub fn for_fast_slides() -> Self {
        Self {
            sample_interval_secs: 0.5,
            segmentation: SegmentationConfig::for_fast_slides(),
            ..Self::default()
        }
    }

    pub fn from_json5_str(text: &str) -> Result<Self, ExtractError> {
        Ok(json5::from_str(text)?)
    }

    pub fn from_json5_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_json5_str(&text)?;
        info!("⚙️ config loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn sample_interval(&self) -> Duration {
        secs_to_duration(self.sample_interval_secs.max(0.001))
    }

    pub fn effective_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

/// 单次运行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_in: u64,
    pub rejected_low_quality: u64,
    pub frames_with_obstructions: u64,
    pub inpainted: u64,
    pub fallback_cleaned: u64,
    pub reverted: u64,
    pub pages_segmented: u64,
    pub pages_out: u64,
}

impl PipelineStats {
    fn accumulate(&mut self, other: &PipelineStats) {
        self.frames_in += other.frames_in;
        self.rejected_low_quality += other.rejected_low_quality;
        self.frames_with_obstructions += other.frames_with_obstructions;
        self.inpainted += other.inpainted;
        self.fallback_cleaned += other.fallback_cleaned;
        self.reverted += other.reverted;
        self.pages_segmented += other.pages_segmented;
        self.pages_out += other.pages_out;
    }
}

/// Frames that passed the gate, after optional cleaning.
#[derive(Debug, Clone)]
pub struct PreparedFrames {
    pub frames: Vec<Frame>,
    pub stats: PipelineStats,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub pages: Vec<Frame>,
    pub stats: PipelineStats,
}

pub struct SlidePipelineBuilder {
    config: PipelineConfig,
    face_detector: Option<Arc<dyn FaceDetector>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    assembler: Option<Arc<dyn DocumentAssembler>>,
}

impl SlidePipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            face_detector: None,
            recognizer: None,
            assembler: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cleaning(mut self, enabled: bool) -> Self {
        self.config.enable_cleaning = enabled;
        self
    }

    pub fn dedup(mut self, enabled: bool) -> Self {
        self.config.enable_dedup = enabled;
        self
    }

    pub fn face_detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.face_detector = Some(detector);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn assembler(mut self, assembler: Arc<dyn DocumentAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn build(self) -> Result<SlidePipeline, ExtractError> {
        let threads = self.config.effective_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("slide-worker-{}", i))
            .build()?;

        let mut detector = ObstructionDetector::with_config(self.config.detector.clone());
        if let Some(face_detector) = self.face_detector {
            detector = detector.with_face_detector(face_detector);
        }

        info!(
            "🎬 SlidePipeline: {} threads, cleaning={}, dedup={}, ocr={}",
            threads,
            self.config.enable_cleaning,
            self.config.enable_dedup,
            self.recognizer.is_some()
        );

        Ok(SlidePipeline {
            gate: FrameQualityGate::with_config(self.config.quality.clone()),
            detector,
            remover: ObstructionRemover::with_config(self.config.remover.clone()),
            segmenter: PageSegmenter::with_config(self.config.segmentation.clone()),
            deduplicator: SlideDeduplicator::with_config(self.config.dedup.clone()),
            recognizer: self.recognizer,
            assembler: self.assembler.unwrap_or_else(|| Arc::new(TextReportAssembler::new())),
            pool,
            totals: Arc::new(Mutex::new(PipelineStats::default())),
            config: self.config,
        })
    }
}

impl Default for SlidePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SlidePipeline {
    config: PipelineConfig,
    gate: FrameQualityGate,
    detector: ObstructionDetector,
    remover: ObstructionRemover,
    segmenter: PageSegmenter,
    deduplicator: SlideDeduplicator,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    assembler: Arc<dyn DocumentAssembler>,
    pool: ThreadPool,
    totals: Arc<Mutex<PipelineStats>>,
}

impl SlidePipeline {
    pub fn builder() -> SlidePipelineBuilder {
        SlidePipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn assembler(&self) -> &dyn DocumentAssembler {
        self.assembler.as_ref()
    }

    /// 质量门限 + 遮挡清理（逐帧并行）
    pub fn prepare(&self, frames: Vec<Frame>) -> PreparedFrames {
        let mut stats = PipelineStats {
            frames_in: frames.len() as u64,
            ..PipelineStats::default()
        };

        let rejected: Vec<bool> = self
            .pool
            .install(|| frames.par_iter().map(|f| self.gate.is_low_quality(f)).collect());
        let retained: Vec<Frame> = frames
            .into_iter()
            .zip(rejected)
            .filter_map(|(frame, reject)| {
                if reject {
                    debug!("🚫 frame #{} rejected by quality gate", frame.frame_number);
                    None
                } else {
                    Some(frame)
                }
            })
            .collect();
        stats.rejected_low_quality = stats.frames_in - retained.len() as u64;

        if !self.config.enable_cleaning {
            return PreparedFrames { frames: retained, stats };
        }

        let cleaned: Vec<(Frame, CleaningOutcome)> = self.pool.install(|| {
            retained
                .into_par_iter()
                .map(|frame| {
                    let regions = self.detector.detect(&frame);
                    if regions.is_empty() {
                        (frame, CleaningOutcome::Untouched)
                    } else {
                        self.remover.clean(&frame, &regions)
                    }
                })
                .collect()
        });

        let mut frames = Vec::with_capacity(cleaned.len());
        for (frame, outcome) in cleaned {
            match outcome {
                CleaningOutcome::Untouched => {}
                CleaningOutcome::Inpainted => stats.inpainted += 1,
                CleaningOutcome::Fallback => stats.fallback_cleaned += 1,
                CleaningOutcome::Reverted => stats.reverted += 1,
            }
            if outcome != CleaningOutcome::Untouched {
                stats.frames_with_obstructions += 1;
            }
            frames.push(frame);
        }

        info!(
            "🧹 prepared {} frames ({} rejected, {} with obstructions)",
            frames.len(),
            stats.rejected_low_quality,
            stats.frames_with_obstructions
        );
        PreparedFrames { frames, stats }
    }

    /// 切分页面 + 可选去重（顺序）
    pub fn select_pages(&self, prepared: PreparedFrames) -> PipelineOutput {
        let PreparedFrames { frames, mut stats } = prepared;

        let pages = self.pool.install(|| self.segmenter.segment(&frames));
        stats.pages_segmented = pages.len() as u64;

        let pages = if self.config.enable_dedup {
            self.pool.install(|| self.deduplicator.deduplicate(&pages))
        } else {
            pages
        };
        stats.pages_out = pages.len() as u64;

        self.record(&stats);
        PipelineOutput { pages, stats }
    }

    /// 帧序列 → 页面，不做 I/O
    pub fn extract_pages(&self, frames: Vec<Frame>) -> PipelineOutput {
        self.select_pages(self.prepare(frames))
    }

    /// 未配置识别器时每页文字为空
    pub fn recognize(&self, pages: Vec<Frame>) -> Vec<RecognizedPage> {
        match &self.recognizer {
            Some(recognizer) => self
                .pool
                .install(|| recognize_pages(recognizer.as_ref(), pages, &self.config.retry)),
            None => pages
                .into_iter()
                .map(|frame| RecognizedPage { frame, text: None })
                .collect(),
        }
    }

    pub fn assemble(&self, pages: &[RecognizedPage], output: &Path) -> Result<(), ExtractError> {
        self.assembler.assemble(pages, output)
    }

    /// 完整流程：提取 → 识别 → 输出
    pub fn run(&self, frames: Vec<Frame>, output: &Path) -> Result<PipelineStats, ExtractError> {
        let PipelineOutput { pages, stats } = self.extract_pages(frames);
        let recognized = self.recognize(pages);
        self.assemble(&recognized, output)?;
        Ok(stats)
    }

    /// 累计统计
    pub fn stats(&self) -> PipelineStats {
        self.lock_totals().clone()
    }

    pub fn reset(&self) {
        *self.lock_totals() = PipelineStats::default();
    }

    fn record(&self, stats: &PipelineStats) {
        self.lock_totals().accumulate(stats);
    }

    fn lock_totals(&self) -> MutexGuard<'_, PipelineStats> {
        // 计数器只做整体累加，锁中毒后仍可继续使用
        self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ocr::MockTextRecognizer;
    use crate::core::video::obstruction::{DetectionBox, MockFaceDetector};
    use crate::core::video::test_support::{sequence as lecture, uniform_frame};

    fn test_pipeline() -> SlidePipeline {
        SlidePipeline::builder()
            .config(PipelineConfig {
                worker_threads: 2,
                ..PipelineConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_extracts_stable_slides() {
        let pipeline = test_pipeline();
        let frames = lecture(&[(1, 0.0), (1, 1.0), (1, 2.0), (2, 3.0), (2, 4.0), (2, 5.0)]);

        let out = pipeline.extract_pages(frames);
        assert_eq!(out.pages.len(), 2);
        assert_eq!(out.stats.frames_in, 6);
        assert_eq!(out.stats.rejected_low_quality, 0);
        assert_eq!(out.stats.pages_out, 2);
    }

    #[test]
    fn test_black_transition_frames_filtered() {
        let pipeline = test_pipeline();
        let mut frames = lecture(&[(1, 0.0), (1, 1.0), (1, 2.0)]);
        frames.push(uniform_frame(320, 240, 0, 2.5));
        frames.extend(lecture(&[(2, 3.0), (2, 4.0), (2, 5.0)]));

        let out = pipeline.extract_pages(frames);
        assert_eq!(out.stats.rejected_low_quality, 1);
        assert_eq!(out.pages.len(), 2);
    }

    #[test]
    fn test_revisited_slide_removed_by_dedup() {
        let frames = lecture(&[(1, 0.0), (1, 1.0), (1, 2.0), (2, 3.0), (2, 4.0), (2, 5.0), (1, 6.0), (1, 7.0), (1, 8.0)]);

        let with_dedup = test_pipeline().extract_pages(frames.clone());
        assert_eq!(with_dedup.stats.pages_segmented, 3);
        assert_eq!(with_dedup.pages.len(), 2);

        let without = SlidePipeline::builder()
            .config(PipelineConfig {
                worker_threads: 2,
                ..PipelineConfig::default()
            })
            .dedup(false)
            .build()
            .unwrap()
            .extract_pages(frames);
        assert_eq!(without.pages.len(), 3);
    }

    #[test]
    fn test_face_regions_cleaned() {
        let faces = MockFaceDetector::with_boxes(vec![DetectionBox { x: 200, y: 20, width: 40, height: 40 }]);
        let pipeline = SlidePipeline::builder()
            .config(PipelineConfig {
                worker_threads: 2,
                ..PipelineConfig::default()
            })
            .face_detector(Arc::new(faces))
            .build()
            .unwrap();

        let out = pipeline.prepare(lecture(&[(1, 0.0), (1, 1.0)]));
        assert_eq!(out.stats.frames_with_obstructions, 2);
        assert_eq!(out.stats.inpainted + out.stats.fallback_cleaned + out.stats.reverted, 2);
        assert_eq!(out.frames.len(), 2);
    }

    #[test]
    fn test_cleaning_disabled_keeps_frames_untouched() {
        let faces = MockFaceDetector::with_boxes(vec![DetectionBox { x: 200, y: 20, width: 40, height: 40 }]);
        let frames = lecture(&[(1, 0.0)]);
        let pipeline = SlidePipeline::builder()
            .face_detector(Arc::new(faces))
            .cleaning(false)
            .build()
            .unwrap();

        let out = pipeline.prepare(frames.clone());
        assert_eq!(out.frames, frames);
        assert_eq!(out.stats.frames_with_obstructions, 0);
    }

    #[test]
    fn test_run_writes_report_and_tracks_totals() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("notes.txt");
        let pipeline = SlidePipeline::builder()
            .config(PipelineConfig {
                worker_threads: 2,
                ..PipelineConfig::default()
            })
            .recognizer(Arc::new(MockTextRecognizer::with_text("Binary search")))
            .build()
            .unwrap();

        let stats = pipeline
            .run(lecture(&[(1, 0.0), (1, 1.0), (1, 2.0), (2, 3.0), (2, 5.0)]), &output)
            .unwrap();
        assert_eq!(stats.pages_out, 2);

        let report = fs::read_to_string(&output).unwrap();
        assert_eq!(report.matches("Binary search").count(), 2);

        pipeline.extract_pages(lecture(&[(3, 0.0), (3, 2.0)]));
        assert_eq!(pipeline.stats().frames_in, 7);
        pipeline.reset();
        assert_eq!(pipeline.stats(), PipelineStats::default());
    }

    #[test]
    fn test_config_from_json5() {
        let config = PipelineConfig::from_json5_str(
            r#"{
                // 只覆盖部分字段
                sample_interval_secs: 2,
                enable_dedup: false,
                segmentation: { min_page_duration: 3.5 },
                quality: { min_sharpness: 80 },
            }"#,
        )
        .unwrap();

        assert_eq!(config.sample_interval_secs, 2.0);
        assert!(!config.enable_dedup);
        assert!(config.enable_cleaning);
        assert_eq!(config.segmentation.min_page_duration, 3.5);
        assert_eq!(config.segmentation.hash_threshold, 10);
        assert_eq!(config.quality.min_sharpness, 80.0);
        assert_eq!(config.dedup.similarity_threshold, 5);
    }

    #[test]
    fn test_config_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json5");
        fs::write(&path, "{ sample_interval_secs: ").unwrap();
        assert!(matches!(PipelineConfig::from_json5_file(&path), Err(ExtractError::Config(_))));
        assert!(matches!(
            PipelineConfig::from_json5_file(dir.path().join("missing.json5")),
            Err(ExtractError::Io(_))
        ));
    }

    #[test]
    fn test_unbounded_durations_from_config() {
        let config = PipelineConfig::from_json5_str(
            "{ sample_interval_secs: 1e30, segmentation: { min_page_duration: Infinity } }",
        )
        .unwrap();
        assert_eq!(config.sample_interval(), Duration::MAX);

        let pipeline = SlidePipeline::builder()
            .config(PipelineConfig {
                worker_threads: 2,
                ..config
            })
            .build()
            .unwrap();
        let out = pipeline.extract_pages(lecture(&[(1, 0.0), (1, 1.0), (1, 2.0), (2, 3.0), (2, 5.0)]));
        assert!(out.pages.is_empty());
        assert_eq!(out.stats.frames_in, 5);
    }

    #[test]
    fn test_stats_survive_poisoned_lock() {
        let pipeline = test_pipeline();
        let totals = Arc::clone(&pipeline.totals);
        let poisoned = std::thread::spawn(move || {
            let _guard = totals.lock().unwrap();
            panic!("worker died holding the stats lock");
        })
        .join();
        assert!(poisoned.is_err());
        assert!(pipeline.totals.is_poisoned());

        pipeline.extract_pages(lecture(&[(1, 0.0), (1, 2.0)]));
        assert_eq!(pipeline.stats().frames_in, 2);
        pipeline.reset();
        assert_eq!(pipeline.stats(), PipelineStats::default());
    }

    #[test]
    fn test_presets() {
        assert_eq!(PipelineConfig::for_lectures().sample_interval(), Duration::from_secs(2));
        assert!(PipelineConfig::for_fast_slides().segmentation.min_page_duration < 2.0);
        assert!(PipelineConfig::default().effective_threads() >= 1);
    }
}
