use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::core::video::VideoError;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Video error: {0}")]
    Video(#[from] VideoError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] json5::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("No frames found in {0}")]
    NoFrames(PathBuf),
    #[error("Unknown job: {0}")]
    UnknownJob(Uuid),
}
