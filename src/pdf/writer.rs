//! Encoding rendered pages to image files

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::DEFAULT_JPEG_QUALITY;
use super::request::JobFault;
use super::types::{OutputFormat, RasterPage};

/// Serializes a rendered page to `path` in `format`
pub trait ImageWriter: Send + Sync {
    fn write(&self, page: &RasterPage, format: OutputFormat, path: &Path) -> Result<(), JobFault>;
}

/// `page_<N>.<ext>` for a zero-based page index
#[must_use]
pub fn page_file_name(page_index: usize, format: OutputFormat) -> String {
    format!("page_{}.{}", page_index + 1, format.extension())
}

/// Encoder backed by the `image` crate
#[derive(Clone, Copy, Debug)]
pub struct ImageCrateWriter {
    jpeg_quality: u8,
}

impl Default for ImageCrateWriter {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageCrateWriter {
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

impl ImageWriter for ImageCrateWriter {
    fn write(&self, page: &RasterPage, format: OutputFormat, path: &Path) -> Result<(), JobFault> {
        if !page.is_consistent() {
            return Err(JobFault::generic(format!(
                "Pixel buffer size mismatch: {} bytes for {}x{}",
                page.pixels.len(),
                page.width_px,
                page.height_px
            )));
        }

        let mut out = BufWriter::new(File::create(path)?);
        match format {
            OutputFormat::Png => PngEncoder::new(&mut out).write_image(
                &page.pixels,
                page.width_px,
                page.height_px,
                ExtendedColorType::Rgb8,
            )?,
            OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
                .write_image(
                    &page.pixels,
                    page.width_px,
                    page.height_px,
                    ExtendedColorType::Rgb8,
                )?,
        }
        out.flush()?;
        Ok(())
    }
}
