//! Thumbnail builder - decode, fit within bounds, encode
//!
//! All functions here are CPU bound and synchronous; the pipeline runs them
//! on the blocking pool while a worker slot is held.

use cumulus_core::constants::{
    DEFAULT_THUMB_ENCODE_METHOD, DEFAULT_THUMB_ENCODE_QUALITY, THUMB_ENCODE_METHOD,
    THUMB_ENCODE_QUALITY,
};
use cumulus_core::{SettingsProvider, ThumbSize};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

/// Output encoding of generated thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbEncoding {
    Jpeg { quality: u8 },
    Png,
}

impl ThumbEncoding {
    /// Read `thumb_encode_method` / `thumb_encode_quality`.
    ///
    /// Unknown methods fall back to JPEG; quality is clamped to 1..=100.
    pub async fn from_settings(settings: &dyn SettingsProvider) -> Self {
        let method = settings
            .get_or(THUMB_ENCODE_METHOD, DEFAULT_THUMB_ENCODE_METHOD)
            .await;
        if method.trim().eq_ignore_ascii_case("png") {
            return ThumbEncoding::Png;
        }

        let quality = settings
            .get_int(THUMB_ENCODE_QUALITY, DEFAULT_THUMB_ENCODE_QUALITY)
            .await
            .clamp(1, 100) as u8;
        ThumbEncoding::Jpeg { quality }
    }
}

impl Default for ThumbEncoding {
    fn default() -> Self {
        ThumbEncoding::Jpeg {
            quality: DEFAULT_THUMB_ENCODE_QUALITY as u8,
        }
    }
}

/// An encoded thumbnail plus the native size of its source.
#[derive(Debug, Clone)]
pub struct RenderedThumb {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

pub struct ThumbnailBuilder;

impl ThumbnailBuilder {
    pub fn decode(data: &[u8]) -> Result<DynamicImage, image::ImageError> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()
    }

    /// Largest size that fits within `bound` keeping the aspect ratio.
    /// Images already inside the bound keep their size.
    pub fn fit_within(width: u32, height: u32, bound: ThumbSize) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        if width <= bound.width && height <= bound.height {
            return (width, height);
        }

        let scale = f64::min(
            bound.width as f64 / width as f64,
            bound.height as f64 / height as f64,
        );
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        (w, h)
    }

    /// Pick a resampling filter by downscale ratio: cheaper filters for
    /// large reductions, Lanczos when close to the original size.
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    pub fn encode(
        img: &DynamicImage,
        encoding: ThumbEncoding,
    ) -> Result<Vec<u8>, image::ImageError> {
        let (width, height) = img.dimensions();
        let mut buffer = Vec::with_capacity(width as usize * height as usize * 3 / 4);

        match encoding {
            ThumbEncoding::Jpeg { quality } => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                rgb.write_with_encoder(encoder)?;
            }
            ThumbEncoding::Png => {
                img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            }
        }

        Ok(buffer)
    }

    /// Decode `data`, fit it within `bound` and encode it.
    pub fn render(
        data: &[u8],
        bound: ThumbSize,
        encoding: ThumbEncoding,
    ) -> Result<RenderedThumb, image::ImageError> {
        let img = Self::decode(data)?;
        let (width, height) = img.dimensions();

        let (target_w, target_h) = Self::fit_within(width, height, bound);
        let thumb = if (target_w, target_h) == (width, height) {
            img
        } else {
            let filter = Self::select_filter(width, height, target_w, target_h);
            img.resize_exact(target_w, target_h, filter)
        };

        let bytes = Self::encode(&thumb, encoding)?;
        Ok(RenderedThumb {
            width,
            height,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::MemorySettings;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 128]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_fit_within_preserves_aspect_ratio() {
        let bound = ThumbSize::new(400, 300);
        assert_eq!(ThumbnailBuilder::fit_within(800, 600, bound), (400, 300));
        assert_eq!(ThumbnailBuilder::fit_within(1000, 500, bound), (400, 200));
        assert_eq!(ThumbnailBuilder::fit_within(300, 900, bound), (100, 300));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        let bound = ThumbSize::new(400, 300);
        assert_eq!(ThumbnailBuilder::fit_within(40, 30, bound), (40, 30));
        assert_eq!(ThumbnailBuilder::fit_within(400, 300, bound), (400, 300));
    }

    #[test]
    fn test_fit_within_keeps_one_pixel_minimum() {
        let bound = ThumbSize::new(400, 300);
        assert_eq!(ThumbnailBuilder::fit_within(10000, 2, bound), (400, 1));
    }

    #[test]
    fn test_select_filter_by_ratio() {
        assert_eq!(ThumbnailBuilder::select_filter(1000, 1000, 100, 100), FilterType::Triangle);
        assert_eq!(ThumbnailBuilder::select_filter(180, 180, 100, 100), FilterType::CatmullRom);
        assert_eq!(ThumbnailBuilder::select_filter(120, 120, 100, 100), FilterType::Lanczos3);
    }

    #[test]
    fn test_render_reports_native_size_and_emits_jpeg() {
        let data = png_bytes(800, 400);
        let rendered =
            ThumbnailBuilder::render(&data, ThumbSize::new(400, 300), ThumbEncoding::default())
                .unwrap();

        assert_eq!((rendered.width, rendered.height), (800, 400));
        assert_eq!(&rendered.bytes[..2], &[0xFF, 0xD8]);

        let thumb = ThumbnailBuilder::decode(&rendered.bytes).unwrap();
        assert_eq!(thumb.dimensions(), (400, 200));
    }

    #[test]
    fn test_render_png_encoding() {
        let img = RgbImage::from_pixel(50, 50, Rgb([1, 2, 3]));
        let mut data = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();

        let rendered =
            ThumbnailBuilder::render(&data, ThumbSize::new(400, 300), ThumbEncoding::Png).unwrap();
        assert_eq!(&rendered.bytes[1..4], b"PNG");
        assert_eq!(
            ThumbnailBuilder::decode(&rendered.bytes).unwrap().dimensions(),
            (50, 50)
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ThumbnailBuilder::decode(b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn test_encoding_from_settings() {
        let settings = MemorySettings::new();
        assert_eq!(
            ThumbEncoding::from_settings(&settings).await,
            ThumbEncoding::Jpeg { quality: 85 }
        );

        settings.set(THUMB_ENCODE_QUALITY, "250");
        assert_eq!(
            ThumbEncoding::from_settings(&settings).await,
            ThumbEncoding::Jpeg { quality: 100 }
        );

        settings.set(THUMB_ENCODE_METHOD, "PNG");
        assert_eq!(ThumbEncoding::from_settings(&settings).await, ThumbEncoding::Png);
    }
}
