pub mod assemble;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod ocr;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod source;

pub use assemble::{DocumentAssembler, PdfAssembler, TextReportAssembler, ZipArchiveAssembler};
pub use error::ExtractError;
pub use fetch::{FfmpegCliSampler, FrameSampler, HttpVideoFetcher};
pub use jobs::{JobRecord, JobStatus, JobStore};
pub use ocr::{clean_text, parse_tsv, MockTextRecognizer, RecognizedPage, TesseractCliRecognizer, TextRecognizer};
pub use pipeline::{PipelineConfig, PipelineOutput, PipelineStats, SlidePipeline, SlidePipelineBuilder};
pub use retry::RetryPolicy;
pub use runner::{JobOutcome, JobRunner};
pub use source::{FrameSource, ImageSequenceSource, InMemorySource};
