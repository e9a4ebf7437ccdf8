//! 文字识别接入点

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use image::{GrayImage, ImageFormat};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use super::error::ExtractError;
use super::retry::RetryPolicy;
use crate::core::video::{enhance_for_ocr, EnhanceConfig, Frame};

static WHITESPACE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\s+"));
static ARTIFACTS: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"[|\\]"));

/// 单帧文字识别，失败可重试
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedPage {
    pub frame: Frame,
    /// 识别失败或没有文字时为 None
    pub text: Option<String>,
}

/// 合并空白、去掉 `|` `\` 等常见误识别字符
pub fn clean_text(raw: &str) -> Result<String, ExtractError> {
    let whitespace = WHITESPACE.as_ref().map_err(Clone::clone)?;
    let artifacts = ARTIFACTS.as_ref().map_err(Clone::clone)?;
    let collapsed = whitespace.replace_all(raw, " ");
    Ok(artifacts.replace_all(&collapsed, "").trim().to_string())
}

/// 逐页识别；单页重试耗尽只丢失该页文字，不影响整体
pub fn recognize_pages(recognizer: &dyn TextRecognizer, pages: Vec<Frame>, retry: &RetryPolicy) -> Vec<RecognizedPage> {
    let total = pages.len();
    let recognized: Vec<RecognizedPage> = pages
        .into_par_iter()
        .map(|frame| {
            let label = format!("ocr frame #{}", frame.frame_number);
            let text = match retry.run(&label, |_| recognizer.recognize(&frame)).and_then(|raw| clean_text(&raw)) {
                Ok(text) => Some(text).filter(|t| !t.is_empty()),
                Err(e) => {
                    warn!("⚠️ {}: no text ({})", label, e);
                    None
                }
            };
            debug!("🔤 frame #{}: {} chars", frame.frame_number, text.as_ref().map_or(0, |t| t.len()));
            RecognizedPage { frame, text }
        })
        .collect();

    let with_text = recognized.iter().filter(|p| p.text.is_some()).count();
    info!("🔤 OCR: {}/{} pages with text", with_text, total);
    recognized
}

/// 调用本机 `tesseract` 可执行文件
#[derive(Debug, Clone)]
pub struct TesseractCliRecognizer {
    binary: PathBuf,
    lang: String,
    page_segmentation_mode: u32,
    /// None 时直接送灰度图
    enhance: Option<EnhanceConfig>,
}

impl TesseractCliRecognizer {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            lang: "eng".to_string(),
            // 6 = 单一文本块
            page_segmentation_mode: 6,
            enhance: Some(EnhanceConfig::default()),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_enhance(mut self, enhance: Option<EnhanceConfig>) -> Self {
        self.enhance = enhance;
        self
    }

    /// 送入 tesseract 的图像：灰度，按配置做去噪/增强/二值化
    pub fn prepare(&self, frame: &Frame) -> Result<GrayImage, ExtractError> {
        let gray = frame
            .to_gray_image()
            .ok_or_else(|| ExtractError::Ocr(format!("frame #{} has a malformed buffer", frame.frame_number)))?;
        Ok(match &self.enhance {
            Some(config) => enhance_for_ocr(&gray, config),
            None => gray,
        })
    }

    /// 文字及平均词置信度（0..=1），置信度不大于 0 的词丢弃
    pub fn recognize_with_confidence(&self, frame: &Frame) -> Result<(String, f32), ExtractError> {
        let tsv = self.run(frame, Some("tsv"))?;
        parse_tsv(&tsv)
    }

    fn run(&self, frame: &Frame, output_config: Option<&str>) -> Result<String, ExtractError> {
        let image = self.prepare(frame)?;
        let input = tempfile::Builder::new().suffix(".png").tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", &self.lang, "--oem", "3", "--psm"])
            .arg(self.page_segmentation_mode.to_string())
            .args(output_config.map(OsStr::new))
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr(format!("tesseract exited with {}: {}", output.status, stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractCliRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractCliRecognizer {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError> {
        self.run(frame, None)
    }
}

/// 解析 tesseract TSV 输出：第 11 列置信度，第 12 列词
pub fn parse_tsv(tsv: &str) -> Result<(String, f32), ExtractError> {
    let mut words = Vec::new();
    let mut total = 0f32;
    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let confidence = match columns[10].trim().parse::<f32>() {
            Ok(c) if c > 0.0 => c,
            _ => continue,
        };
        words.push(columns[11]);
        total += confidence;
    }

    let average = if words.is_empty() { 0.0 } else { total / words.len() as f32 };
    Ok((clean_text(&words.join(" "))?, average / 100.0))
}

/// 测试用识别器：按帧号给出文字，可模拟前 N 次失败
pub struct MockTextRecognizer {
    text_for_frame: Box<dyn Fn(u64) -> Option<String> + Send + Sync>,
    failures_left: AtomicU32,
}

impl MockTextRecognizer {
    pub fn new() -> Self {
        Self::with_pattern(|_| None)
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            text_for_frame: Box::new(pattern),
            failures_left: AtomicU32::new(0),
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_pattern(move |_| Some(text.clone()))
    }

    pub fn failing_first(self, failures: u32) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }
}

impl Default for MockTextRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExtractError::Ocr("simulated failure".to_string()));
        }
        Ok((self.text_for_frame)(frame.frame_number).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame(frame_number: u64) -> Frame {
        Frame::at_secs(4, 4, vec![128u8; 64], frame_number as f64, frame_number)
    }

    fn instant_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_clean_text() {
        // 先合并空白再删字符，删掉的 `|` 两侧空格保留
        assert_eq!(clean_text("  Hello |  world\\\n\n second\tline  ").unwrap(), "Hello  world second line");
        assert_eq!(clean_text("a\\b|c").unwrap(), "abc");
        assert_eq!(clean_text(" | \\ ").unwrap(), "");
    }

    #[test]
    fn test_pages_keep_order_and_text() {
        let recognizer = MockTextRecognizer::with_pattern(|n| (n % 2 == 0).then(|| format!("slide {}", n)));
        let pages: Vec<Frame> = (0..6).map(create_test_frame).collect();

        let out = recognize_pages(&recognizer, pages, &instant_retry());
        assert_eq!(out.len(), 6);
        for (i, page) in out.iter().enumerate() {
            assert_eq!(page.frame.frame_number, i as u64);
            if i % 2 == 0 {
                assert_eq!(page.text.as_deref(), Some(format!("slide {}", i).as_str()));
            } else {
                assert!(page.text.is_none());
            }
        }
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let recognizer = MockTextRecognizer::with_text("Intro").failing_first(2);
        let out = recognize_pages(&recognizer, vec![create_test_frame(1)], &instant_retry());
        assert_eq!(out[0].text.as_deref(), Some("Intro"));
    }

    #[test]
    fn test_exhausted_retries_leave_page_without_text() {
        let recognizer = MockTextRecognizer::with_text("Intro").failing_first(10);
        let out = recognize_pages(&recognizer, vec![create_test_frame(1)], &instant_retry());
        assert_eq!(out.len(), 1);
        assert!(out[0].text.is_none());
    }

    #[test]
    fn test_tsv_confidence_skips_layout_rows() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t96.5\tBinary\n\
                   5\t1\t1\t1\t1\t2\t95\t10\t80\t20\t83.5\tsearch|\n\
                   5\t1\t1\t1\t1\t3\t180\t10\t5\t20\t0\t~\n";
        let (text, confidence) = parse_tsv(tsv).unwrap();
        assert_eq!(text, "Binary search");
        assert!((confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_tsv_without_words_has_zero_confidence() {
        let (text, confidence) = parse_tsv("level\tpage_num\n").unwrap();
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_prepared_image_is_binarized() {
        // 浅底深色横条
        let data: Vec<u8> = (0..48u32 * 64)
            .flat_map(|i| {
                let v = if (i / 64) % 12 < 3 { 30 } else { 200 };
                [v, v, v, 255]
            })
            .collect();
        let frame = Frame::at_secs(64, 48, data, 0.0, 0);

        let enhanced = TesseractCliRecognizer::new().prepare(&frame).unwrap();
        assert!(enhanced.as_raw().iter().all(|&v| v == 0 || v == 255));
        assert_eq!(enhanced.get_pixel(20, 13).0[0], 0);

        let plain = TesseractCliRecognizer::new().with_enhance(None).prepare(&frame).unwrap();
        assert_eq!(plain.get_pixel(20, 13).0[0], 30);
    }

    #[test]
    fn test_missing_tesseract_binary_is_an_error() {
        let recognizer = TesseractCliRecognizer::new().with_binary("/nonexistent/tesseract-binary");
        let frame = Frame::at_secs(8, 8, vec![200u8; 256], 0.0, 0);
        assert!(matches!(recognizer.recognize(&frame), Err(ExtractError::Io(_))));
    }
}
