use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use log::info;

use slide_extract::api::{
    DocumentAssembler, ExtractError, FfmpegCliSampler, FrameSource, HttpVideoFetcher, ImageSequenceSource, JobOutcome,
    JobRunner, JobStore, PdfAssembler, PipelineConfig, SlidePipeline, TesseractCliRecognizer, TextReportAssembler,
    ZipArchiveAssembler,
};
use slide_extract::core::video::obstruction::{CascadeFaceDetector, HaarCascade};

#[derive(Debug, Parser)]
#[command(about = "Extract slide pages from a lecture video")]
pub struct Args {
    /// Video URL, local video file, or directory of sampled frame images
    #[arg()]
    pub input: String,
    /// Directory for the generated document
    #[arg(short, long, default_value_os_t = PathBuf::from("output"))]
    pub output_dir: PathBuf,
    /// Output document format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
    pub format: FormatArg,
    /// JSON5 pipeline config; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Use lecture presets (slower sampling, longer dwell)
    #[arg(long)]
    pub lecture: bool,
    /// Seconds between sampled frames
    #[arg(short, long)]
    pub interval: Option<f64>,
    /// Max fingerprint distance still treated as the same page
    #[arg(long)]
    pub hash_threshold: Option<u32>,
    /// Seconds a page must stay on screen to be kept
    #[arg(long)]
    pub min_page_duration: Option<f64>,
    /// Threads to use (0 for automatic setting)
    #[arg(short, long)]
    pub threads: Option<usize>,
    /// Skip face/overlay removal
    #[arg(long)]
    pub no_clean: bool,
    /// Keep revisited pages
    #[arg(long)]
    pub no_dedup: bool,
    /// Haar cascade (JSON, or OpenCV XML) used for face detection
    #[arg(long)]
    pub cascade: Option<PathBuf>,
    /// Run tesseract on every page
    #[arg(long)]
    pub ocr: bool,
    /// Send plain grayscale to tesseract, without denoise and thresholding
    #[arg(long)]
    pub raw_ocr: bool,
    /// Tesseract language
    #[arg(long, default_value = "eng")]
    pub lang: String,
    /// Document title
    #[arg(long, default_value = "Lecture Notes")]
    pub title: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FormatArg {
    Text,
    Zip,
    Pdf,
}

impl FormatArg {
    fn assembler(self, title: &str) -> Arc<dyn DocumentAssembler> {
        match self {
            FormatArg::Text => Arc::new(TextReportAssembler::with_title(title)),
            FormatArg::Zip => Arc::new(ZipArchiveAssembler::with_title(title)),
            FormatArg::Pdf => Arc::new(PdfAssembler::with_title(title)),
        }
    }
}

fn main() {
    slide_extract::init_logging();
    let args = <Args as Parser>::parse();

    match run(&args) {
        Ok(outcome) => {
            info!(
                "📊 {} frames in, {} rejected, {} cleaned, {} pages",
                outcome.stats.frames_in,
                outcome.stats.rejected_low_quality,
                outcome.stats.frames_with_obstructions,
                outcome.stats.pages_out
            );
            println!("{}", outcome.output_path.display());
        }
        Err(e) => {
            eprintln!("Extraction failed: {e}");
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<PipelineConfig, ExtractError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json5_file(path)?,
        None if args.lecture => PipelineConfig::for_lectures(),
        None => PipelineConfig::default(),
    };
    if let Some(interval) = args.interval {
        config.sample_interval_secs = interval;
    }
    if let Some(threshold) = args.hash_threshold {
        config.segmentation.hash_threshold = threshold;
    }
    if let Some(duration) = args.min_page_duration {
        config.segmentation.min_page_duration = duration;
    }
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }
    Ok(config)
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<SlidePipeline, ExtractError> {
    let mut builder = SlidePipeline::builder()
        .config(config)
        .assembler(args.format.assembler(&args.title));
    if args.no_clean {
        builder = builder.cleaning(false);
    }
    if args.no_dedup {
        builder = builder.dedup(false);
    }
    if let Some(path) = &args.cascade {
        let cascade = HaarCascade::from_path(path)?;
        builder = builder.face_detector(Arc::new(CascadeFaceDetector::new(cascade)));
    }
    if args.ocr {
        let mut recognizer = TesseractCliRecognizer::new().with_lang(args.lang.as_str());
        if args.raw_ocr {
            recognizer = recognizer.with_enhance(None);
        }
        builder = builder.recognizer(Arc::new(recognizer));
    }
    builder.build()
}

fn run(args: &Args) -> Result<JobOutcome, ExtractError> {
    let config = load_config(args)?;
    let retry = config.retry.clone();
    let pipeline = build_pipeline(args, config)?;
    let runner = JobRunner::new(
        Arc::new(JobStore::new()),
        pipeline,
        Arc::new(FfmpegCliSampler::new()),
        &args.output_dir,
    );
    let id = runner.submit(&args.input);

    let input = Path::new(&args.input);
    if args.input.starts_with("http://") || args.input.starts_with("https://") {
        runner.with_fetcher(HttpVideoFetcher::new(retry)?).run_url(id)
    } else if input.is_dir() {
        let interval = runner.pipeline().config().sample_interval();
        let frames = ImageSequenceSource::new(input, interval).frames()?;
        runner.run_frames(id, frames)
    } else {
        info!("🎥 sampling local video {}", input.display());
        runner.run_video(id, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slide_extract::core::video::Frame;
    use std::time::Duration;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["slide_extract", "frames"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    /// 320x240 竖条纹，`value` 不同则条纹相位相反
    fn striped(value: u8, secs: f64, n: u64) -> Frame {
        let data = (0..240u32)
            .flat_map(|_| 0..320u32)
            .flat_map(|x| {
                let v = if (x / 16) % 2 == 0 { 255 - value } else { value };
                [v, v, v, 255]
            })
            .collect();
        Frame::at_secs(320, 240, data, secs, n)
    }

    #[test]
    fn test_flags_override_config() {
        let args = args(&["--interval", "0.5", "--hash-threshold", "7", "--threads", "3", "--format", "pdf"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.sample_interval(), Duration::from_millis(500));
        assert_eq!(config.segmentation.hash_threshold, 7);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(args.format.assembler(&args.title).extension(), "pdf");
    }

    #[test]
    fn test_unbounded_durations_from_flags() {
        let args = args(&["--min-page-duration", "inf", "--interval", "1e30", "--no-clean"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.sample_interval(), Duration::MAX);

        let pipeline = build_pipeline(&args, config).unwrap();
        let frames = vec![
            striped(0, 0.0, 0),
            striped(0, 5.0, 1),
            striped(200, 10.0, 2),
            striped(200, 15.0, 3),
        ];
        let output = pipeline.extract_pages(frames);
        assert_eq!(output.stats.frames_in, 4);
        assert_eq!(output.stats.rejected_low_quality, 0);
        assert!(output.pages.is_empty());
    }
}
