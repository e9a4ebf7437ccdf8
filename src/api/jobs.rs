//! 任务状态表

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Extracting,
    Cleaning,
    Detecting,
    Ocr,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    /// 各阶段对应的进度百分比
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 10,
            JobStatus::Extracting => 25,
            JobStatus::Cleaning => 40,
            JobStatus::Detecting => 60,
            JobStatus::Ocr => 80,
            JobStatus::Generating => 90,
            JobStatus::Completed => 100,
            // update() 遇到失败不改写进度
            JobStatus::Failed => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub url: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 进程内任务表
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobRecord>> {
        // 记录只做整体替换，锁中毒后数据仍一致
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, url: impl Into<String>) -> Uuid {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            url: url.into(),
            status: JobStatus::Queued,
            progress: JobStatus::Queued.progress(),
            message: "Job queued".to_string(),
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = record.id;
        info!("🆕 job {} queued for {}", id, record.url);
        self.lock().insert(id, record);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.lock().get(&id).cloned()
    }

    /// 按创建时间排序
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.lock().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn update(&self, id: Uuid, status: JobStatus, message: impl Into<String>) -> Result<(), ExtractError> {
        self.modify(id, |job| {
            job.status = status;
            if status != JobStatus::Failed {
                job.progress = status.progress();
            }
            job.message = message.into();
        })?;
        info!("📍 job {}: {:?} ({}%)", id, status, status.progress());
        Ok(())
    }

    pub fn set_message(&self, id: Uuid, message: impl Into<String>) -> Result<(), ExtractError> {
        self.modify(id, |job| job.message = message.into())
    }

    pub fn complete(&self, id: Uuid, output_path: PathBuf, message: impl Into<String>) -> Result<(), ExtractError> {
        self.modify(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = JobStatus::Completed.progress();
            job.message = message.into();
            job.output_path = Some(output_path);
        })?;
        info!("✅ job {} completed", id);
        Ok(())
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<(), ExtractError> {
        let error = error.into();
        warn!("❌ job {} failed: {}", id, error);
        self.modify(id, |job| {
            job.status = JobStatus::Failed;
            job.message = format!("Extraction failed: {}", error);
            job.error = Some(error);
        })
    }

    pub fn remove(&self, id: Uuid) -> Option<JobRecord> {
        self.lock().remove(&id)
    }

    pub fn snapshot_json(&self) -> Result<String, ExtractError> {
        Ok(serde_json::to_string_pretty(&self.list())?)
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<(), ExtractError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(ExtractError::UnknownJob(id))?;
        f(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}
