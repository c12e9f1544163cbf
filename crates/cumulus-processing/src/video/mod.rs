//! Video still extraction

pub mod frame;

pub use frame::{FfmpegFrameExtractor, FrameExtractor};
