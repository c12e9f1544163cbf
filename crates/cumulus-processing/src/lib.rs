//! Cumulus Processing Library
//!
//! Thumbnail and preview generation for stored files.
//!
//! # Components
//!
//! - [`WorkerPool`]: process-wide admission gate bounding concurrent codec work
//! - [`ThumbnailBuilder`]: decode, fit and encode still images
//! - [`FrameExtractor`]: pull a still frame out of a video
//! - [`DerivativePipeline`]: retrieval with local fallback, thumbnail and
//!   preview generation, picture-info write-back

pub mod error;
pub mod extension;
pub mod image;
pub mod pipeline;
pub mod pool;
pub mod reclaim;
pub mod video;

pub use error::{GenerationError, ThumbError};
pub use extension::{classify, MediaKind};
pub use image::{RenderedThumb, ThumbEncoding, ThumbnailBuilder};
pub use pipeline::{Derivative, DerivativePipeline, GenerationOutcome, SkipReason};
pub use pool::{WorkerPool, WorkerSlot};
pub use reclaim::{NoopReclaim, ReclaimHook};
pub use video::{FfmpegFrameExtractor, FrameExtractor};
