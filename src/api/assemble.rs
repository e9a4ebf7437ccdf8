//! 输出文档组装

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use log::info;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::ExtractError;
use super::ocr::RecognizedPage;
use crate::core::video::Frame;

const NO_TEXT: &str = "[no text extracted]";

pub trait DocumentAssembler: Send + Sync {
    /// 输出文件扩展名（不含点）
    fn extension(&self) -> &'static str;

    fn assemble(&self, pages: &[RecognizedPage], output: &Path) -> Result<(), ExtractError>;
}

/// 纯文本笔记：标题头 + 每页一节
#[derive(Debug, Clone)]
pub struct TextReportAssembler {
    title: String,
}

impl TextReportAssembler {
    pub fn new() -> Self {
        Self::with_title("Lecture Notes")
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    pub fn render(&self, pages: &[RecognizedPage], generated_at: DateTime<Local>) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push('\n');
        out.push_str(&"=".repeat(self.title.chars().count().max(1)));
        out.push('\n');
        out.push_str(&format!("Generated: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("Slides: {}\n", pages.len()));

        for (i, page) in pages.iter().enumerate() {
            out.push_str(&format!("\n--- Slide {} ({}) ---\n", i + 1, format_timestamp(page.frame.timestamp)));
            out.push_str(page.text.as_deref().unwrap_or(NO_TEXT));
            out.push('\n');
        }
        out
    }
}

impl Default for TextReportAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler for TextReportAssembler {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn assemble(&self, pages: &[RecognizedPage], output: &Path) -> Result<(), ExtractError> {
        fs::write(output, self.render(pages, Local::now()))?;
        info!("📝 text report written: {} ({} slides)", output.display(), pages.len());
        Ok(())
    }
}

/// 压缩包：`slide_001.png` … 加 `notes.txt`
#[derive(Debug, Clone, Default)]
pub struct ZipArchiveAssembler {
    report: TextReportAssembler,
}

impl ZipArchiveAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            report: TextReportAssembler::with_title(title),
        }
    }
}

impl DocumentAssembler for ZipArchiveAssembler {
    fn extension(&self) -> &'static str {
        "zip"
    }

    fn assemble(&self, pages: &[RecognizedPage], output: &Path) -> Result<(), ExtractError> {
        let mut zip = ZipWriter::new(File::create(output)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (i, page) in pages.iter().enumerate() {
            zip.start_file(slide_file_name(i), options)?;
            zip.write_all(&encode_png(&page.frame)?)?;
        }

        zip.start_file("notes.txt", options)?;
        zip.write_all(self.report.render(pages, Local::now()).as_bytes())?;
        zip.finish()?;

        info!("📦 archive written: {} ({} slides)", output.display(), pages.len());
        Ok(())
    }
}

pub fn slide_file_name(index: usize) -> String {
    format!("slide_{:03}.png", index + 1)
}

fn frame_image(frame: &Frame) -> Result<RgbaImage, ExtractError> {
    frame.to_image().ok_or_else(|| {
        ExtractError::Video(crate::core::video::VideoError::InvalidFrame {
            width: frame.width,
            height: frame.height,
            expected: frame.pixel_count() * 4,
            actual: frame.data.len(),
        })
    })
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, ExtractError> {
    let mut buffer = Cursor::new(Vec::new());
    frame_image(frame)?.write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}

/// A4，单位 pt
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 36;
const JPEG_QUALITY: u8 = 85;

const PDF_DESCRIPTION: [&str; 3] = [
    "This PDF contains slides extracted automatically from a lecture video.",
    "Text recognised on each slide is embedded as searchable text.",
    "Presenter faces and overlays have been removed where detected.",
];

/// PDF 笔记：标题页 + 每页一张幻灯片，OCR 文字以不可见文本层嵌入，可搜索
#[derive(Debug, Clone)]
pub struct PdfAssembler {
    title: String,
}

impl PdfAssembler {
    pub fn new() -> Self {
        Self::with_title("Lecture Notes")
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }

    pub fn build(&self, pages: &[RecognizedPage], generated_at: DateTime<Local>) -> Result<Document, ExtractError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::with_capacity(pages.len() + 1);
        kids.push(self.title_page(&mut doc, pages_id, font_id, pages.len(), generated_at)?);
        for (i, page) in pages.iter().enumerate() {
            kids.push(slide_page(&mut doc, pages_id, font_id, i, page)?);
        }

        let count = kids.len() as i64;
        let kids: Vec<Object> = kids.into_iter().map(Object::Reference).collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(count),
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        Ok(doc)
    }

    fn title_page(
        &self,
        doc: &mut Document,
        pages_id: ObjectId,
        font_id: ObjectId,
        slides: usize,
        generated_at: DateTime<Local>,
    ) -> Result<ObjectId, ExtractError> {
        let mut ops = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN - 24;
        text_line(&mut ops, 24, MARGIN, y, &self.title);
        y -= 40;
        text_line(
            &mut ops,
            10,
            MARGIN,
            y,
            &format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        );
        y -= 16;
        text_line(&mut ops, 10, MARGIN, y, &format!("Slides: {}", slides));
        y -= 28;
        for line in PDF_DESCRIPTION {
            text_line(&mut ops, 10, MARGIN, y, line);
            y -= 14;
        }

        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        add_page(doc, pages_id, ops, resources)
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler for PdfAssembler {
    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn assemble(&self, pages: &[RecognizedPage], output: &Path) -> Result<(), ExtractError> {
        let mut doc = self.build(pages, Local::now())?;
        doc.save(output)?;
        info!("📄 PDF written: {} ({} slides)", output.display(), pages.len());
        Ok(())
    }
}

fn slide_page(
    doc: &mut Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    index: usize,
    page: &RecognizedPage,
) -> Result<ObjectId, ExtractError> {
    let rgb = DynamicImage::ImageRgba8(frame_image(&page.frame)?).to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut jpeg = Cursor::new(Vec::new());
    rgb.write_to(&mut jpeg, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(width as i64),
            "Height" => Object::Integer(height as i64),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
            "Filter" => "DCTDecode",
        },
        jpeg.into_inner(),
    ));

    // 等比缩放到页边距内，贴顶放置
    let max_w = (PAGE_WIDTH - 2 * MARGIN) as f64;
    let max_h = (PAGE_HEIGHT - 4 * MARGIN) as f64;
    let scale = (max_w / width as f64).min(max_h / height as f64);
    let draw_w = ((width as f64 * scale).round() as i64).max(1);
    let draw_h = ((height as f64 * scale).round() as i64).max(1);
    let top = PAGE_HEIGHT - MARGIN;

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Integer(draw_w),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(draw_h),
                Object::Integer(MARGIN),
                Object::Integer(top - draw_h),
            ],
        ),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
    ];

    let caption = format!("Slide {} ({})", index + 1, format_timestamp(page.frame.timestamp));
    text_line(&mut ops, 9, MARGIN, top - draw_h - 14, &caption);

    if let Some(text) = &page.text {
        // 渲染模式 3：不可见但可选中/搜索
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tr", vec![Object::Integer(3)]));
        ops.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(8)]));
        ops.push(Operation::new("TL", vec![Object::Integer(10)]));
        ops.push(Operation::new(
            "Td",
            vec![Object::Integer(MARGIN), Object::Integer(top - draw_h - 30)],
        ));
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            ops.push(Operation::new("Tj", vec![Object::string_literal(pdf_text(line))]));
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new("ET", vec![]));
    }

    let resources = dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Im1" => image_id },
    };
    add_page(doc, pages_id, ops, resources)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    operations: Vec<Operation>,
    resources: lopdf::Dictionary,
) -> Result<ObjectId, ExtractError> {
    let content = Content { operations }.encode()?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let resources_id = doc.add_object(resources);
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    }))
}

fn text_line(ops: &mut Vec<Operation>, size: i64, x: i64, y: i64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(size)]));
    ops.push(Operation::new("Td", vec![Object::Integer(x), Object::Integer(y)]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(pdf_text(text))]));
    ops.push(Operation::new("ET", vec![]));
}

/// Helvetica 内置字体只覆盖 ASCII，其余字符替换为 `?`
fn pdf_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}

/// HH:MM:SS
fn format_timestamp(ts: Duration) -> String {
    let secs = ts.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn create_test_page(secs: f64, text: Option<&str>) -> RecognizedPage {
        let data: Vec<u8> = (0..16 * 16).flat_map(|i| [(i % 256) as u8, 40, 90, 255]).collect();
        RecognizedPage {
            frame: Frame::at_secs(16, 16, data, secs, (secs * 1000.0) as u64),
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_report_layout() {
        let pages = vec![create_test_page(5.0, Some("Intro to graphs")), create_test_page(3725.0, None)];
        let generated_at = Local.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let report = TextReportAssembler::with_title("Graphs").render(&pages, generated_at);

        let expected = "Graphs\n======\nGenerated: 2026-03-01 09:30:00\nSlides: 2\n\
                        \n--- Slide 1 (00:00:05) ---\nIntro to graphs\n\
                        \n--- Slide 2 (01:02:05) ---\n[no text extracted]\n";
        assert_eq!(report, expected);
    }

    #[test]
    fn test_text_report_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        TextReportAssembler::new()
            .assemble(&[create_test_page(1.0, Some("hello"))], &path)
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Lecture Notes\n"));
        assert!(content.contains("hello"));
    }

    #[test]
    fn test_zip_archive_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.zip");
        let pages = vec![create_test_page(0.0, Some("one")), create_test_page(4.0, None)];
        ZipArchiveAssembler::new().assemble(&pages, &path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["notes.txt", "slide_001.png", "slide_002.png"]);

        let mut png = Vec::new();
        archive.by_name("slide_002.png").unwrap().read_to_end(&mut png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.into_raw(), pages[1].frame.data);

        let mut notes = String::new();
        archive.by_name("notes.txt").unwrap().read_to_string(&mut notes).unwrap();
        assert!(notes.contains("one"));
        assert!(notes.contains(NO_TEXT));
    }

    fn page_text(doc: &Document, page_number: u32) -> String {
        let page_id = doc.get_pages()[&page_number];
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn test_pdf_has_title_page_and_one_page_per_slide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        let pages = vec![
            create_test_page(5.0, Some("Binary search\nO(log n)")),
            create_test_page(65.0, None),
        ];
        PdfAssembler::with_title("Algorithms").assemble(&pages, &path).unwrap();

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 3);

        let title = page_text(&doc, 1);
        assert!(title.contains("(Algorithms)"));
        assert!(title.contains("(Slides: 2)"));

        let first = page_text(&doc, 2);
        assert!(first.contains("/Im1 Do"));
        assert!(first.contains("(Binary search)"));
        assert!(first.contains("Slide 1"));

        let second = page_text(&doc, 3);
        assert!(second.contains("/Im1 Do"));
        assert!(!second.contains("Tr"));
    }

    #[test]
    fn test_pdf_with_no_slides_is_title_only() {
        let generated_at = Local.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let doc = PdfAssembler::new().build(&[], generated_at).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(page_text(&doc, 1).contains("(Generated: 2026-03-01 09:30:00)"));
    }

    #[test]
    fn test_pdf_text_replaces_non_ascii() {
        assert_eq!(pdf_text("Größe 42"), b"Gr??e 42".to_vec());
    }

    #[test]
    fn test_malformed_frame_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = create_test_page(0.0, None);
        page.frame.data.truncate(5);
        let result = ZipArchiveAssembler::new().assemble(&[page], &dir.path().join("bad.zip"));
        assert!(matches!(result, Err(ExtractError::Video(_))));
    }
}
