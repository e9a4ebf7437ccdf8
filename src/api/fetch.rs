//! 视频下载与抽帧

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use log::info;
use reqwest::blocking::Client;

use super::error::ExtractError;
use super::retry::RetryPolicy;
use super::source::{FrameSource, ImageSequenceSource};
use crate::core::video::Frame;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("slide_extract/", env!("CARGO_PKG_VERSION"));

/// 把已下载的视频文件按固定间隔采样成帧
pub trait FrameSampler: Send + Sync {
    fn sample(&self, video: &Path, interval: Duration) -> Result<Vec<Frame>, ExtractError>;
}

pub struct HttpVideoFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpVideoFetcher {
    pub fn new(retry: RetryPolicy) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, retry })
    }

    /// 下载到 `dest_dir`，返回本地文件路径
    pub fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ExtractError> {
        fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(file_name_from_url(url));

        let bytes = self.retry.run(&format!("download {}", url), |_| self.download(url, &path))?;
        info!("⬇️ downloaded {} ({} bytes) → {}", url, bytes, path.display());
        Ok(path)
    }

    fn download(&self, url: &str, path: &Path) -> Result<u64, ExtractError> {
        let mut response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(ExtractError::HttpStatus(response.status().as_u16()));
        }
        let mut file = File::create(path)?;
        Ok(response.copy_to(&mut file)?)
    }
}

/// URL 最后一段路径作为文件名，取不到时用 `video.mp4`
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query.split_once("://").map_or(without_query, |(_, rest)| rest);
    let name: String = after_scheme
        .split_once('/')
        .and_then(|(_, path)| path.rsplit('/').find(|s| !s.is_empty()))
        .map(|s| s.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')).collect())
        .unwrap_or_default();
    if name.contains('.') && !name.starts_with('.') {
        name
    } else {
        "video.mp4".to_string()
    }
}

/// 调用本机 `ffmpeg` 按 fps = 1/interval 导出 PNG，再按图片序列读入
#[derive(Debug, Clone)]
pub struct FfmpegCliSampler {
    binary: PathBuf,
}

impl FfmpegCliSampler {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for FfmpegCliSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSampler for FfmpegCliSampler {
    fn sample(&self, video: &Path, interval: Duration) -> Result<Vec<Frame>, ExtractError> {
        let out_dir = tempfile::tempdir()?;
        let fps = 1.0 / interval.as_secs_f64().max(0.001);

        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(video)
            .arg("-vf")
            .arg(format!("fps={}", fps))
            .arg(out_dir.path().join("frame_%06d.png"))
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Io(std::io::Error::other(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            ))));
        }

        ImageSequenceSource::new(out_dir.path(), interval).frames()
    }
}
