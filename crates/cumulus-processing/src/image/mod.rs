//! Still-image thumbnail rendering

pub mod thumbnail;

pub use thumbnail::{RenderedThumb, ThumbEncoding, ThumbnailBuilder};
