use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cascade JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cascade XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("Invalid cascade: {0}")]
    InvalidCascade(String),
    #[error("Frame buffer is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
