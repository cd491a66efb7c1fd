pub mod batch;
pub mod ffmpeg;

pub use batch::{BatchOutcome, BatchRunner, ConversionEvent};
pub use ffmpeg::{FfmpegTranscoder, TranscodeOutcome, Transcoder};
