//! 任务执行：下载 → 抽帧 → 清理 → 切页 → OCR → 输出

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use super::error::ExtractError;
use super::fetch::{FrameSampler, HttpVideoFetcher};
use super::jobs::{JobStatus, JobStore};
use super::pipeline::{PipelineStats, SlidePipeline};
use crate::core::video::Frame;

/// 单个任务的结果
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: Uuid,
    pub output_path: PathBuf,
    pub stats: PipelineStats,
}

pub struct JobRunner {
    store: Arc<JobStore>,
    pipeline: SlidePipeline,
    sampler: Arc<dyn FrameSampler>,
    fetcher: Option<HttpVideoFetcher>,
    output_dir: PathBuf,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        pipeline: SlidePipeline,
        sampler: Arc<dyn FrameSampler>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            pipeline,
            sampler,
            fetcher: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: HttpVideoFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &SlidePipeline {
        &self.pipeline
    }

    /// 登记任务，不执行
    pub fn submit(&self, url: &str) -> Uuid {
        self.store.create(url)
    }

    /// 远程视频：下载到临时目录后执行
    pub fn run_url(&self, id: Uuid) -> Result<JobOutcome, ExtractError> {
        let result = self.try_run_url(id);
        self.finish(id, result)
    }

    /// 本地视频文件
    pub fn run_video(&self, id: Uuid, video: &Path) -> Result<JobOutcome, ExtractError> {
        let result = self.sample(id, video).and_then(|frames| self.process(id, frames));
        self.finish(id, result)
    }

    /// 已采样好的帧，跳过下载和抽帧
    pub fn run_frames(&self, id: Uuid, frames: Vec<Frame>) -> Result<JobOutcome, ExtractError> {
        let result = self.process(id, frames);
        self.finish(id, result)
    }

    fn try_run_url(&self, id: Uuid) -> Result<JobOutcome, ExtractError> {
        let job = self.store.get(id).ok_or(ExtractError::UnknownJob(id))?;
        let fetcher = match &self.fetcher {
            Some(fetcher) => fetcher,
            None => return Err(ExtractError::Io(std::io::Error::other("no video fetcher configured"))),
        };

        self.store.update(id, JobStatus::Downloading, "Downloading video...")?;
        let workdir = tempfile::tempdir()?;
        let video = fetcher.fetch(&job.url, workdir.path())?;

        let frames = self.sample(id, &video)?;
        self.process(id, frames)
    }

    fn sample(&self, id: Uuid, video: &Path) -> Result<Vec<Frame>, ExtractError> {
        self.store.update(id, JobStatus::Extracting, "Extracting frames...")?;
        let frames = self
            .sampler
            .sample(video, self.pipeline.config().sample_interval())?;
        if frames.is_empty() {
            return Err(ExtractError::NoFrames(video.to_path_buf()));
        }
        Ok(frames)
    }

    fn process(&self, id: Uuid, frames: Vec<Frame>) -> Result<JobOutcome, ExtractError> {
        self.store
            .update(id, JobStatus::Cleaning, format!("Cleaning {} frames...", frames.len()))?;
        let prepared = self.pipeline.prepare(frames);

        self.store.update(id, JobStatus::Detecting, "Detecting slide changes...")?;
        let output = self.pipeline.select_pages(prepared);
        self.store
            .set_message(id, format!("Found {} slides", output.pages.len()))?;

        self.store.update(id, JobStatus::Ocr, "Extracting text from frames...")?;
        let pages = self.pipeline.recognize(output.pages);

        self.store.update(id, JobStatus::Generating, "Generating document...")?;
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self
            .output_dir
            .join(format!("{}.{}", id, self.pipeline.assembler().extension()));
        self.pipeline.assemble(&pages, &output_path)?;

        self.store.complete(
            id,
            output_path.clone(),
            format!("Extracted {} slides", pages.len()),
        )?;
        Ok(JobOutcome {
            id,
            output_path,
            stats: output.stats,
        })
    }

    fn finish(&self, id: Uuid, result: Result<JobOutcome, ExtractError>) -> Result<JobOutcome, ExtractError> {
        match result {
            Ok(outcome) => {
                info!("🏁 job {} → {}", id, outcome.output_path.display());
                Ok(outcome)
            }
            Err(e) => {
                // 任务本身不存在时无处记录
                if !matches!(e, ExtractError::UnknownJob(_)) {
                    if let Err(record_err) = self.store.fail(id, e.to_string()) {
                        warn!("⚠️ job {}: could not record failure: {}", id, record_err);
                    }
                }
                Err(e)
            }
        }
    }
}
