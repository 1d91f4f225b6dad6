//! MuPDF-backed document loader

use std::path::Path;

use log::debug;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::render::{DocumentLoader, PageSource};
use super::request::JobFault;
use super::types::RasterPage;

/// PDF user space is 72 units per inch
const POINTS_PER_INCH: f32 = 72.0;

#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfLoader;

pub struct MupdfDocument {
    doc: Document,
    page_count: usize,
}

impl DocumentLoader for MupdfLoader {
    type Document = MupdfDocument;

    fn open(&self, path: &Path) -> Result<MupdfDocument, JobFault> {
        let doc = Document::open(path.to_string_lossy().as_ref())?;
        let page_count = usize::try_from(doc.page_count()?).unwrap_or(0);
        debug!("Opened {} ({page_count} pages)", path.display());
        Ok(MupdfDocument { doc, page_count })
    }
}

impl PageSource for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, page_index: usize, dpi: f32) -> Result<RasterPage, JobFault> {
        let index = i32::try_from(page_index)
            .map_err(|_| JobFault::generic(format!("Page index {page_index} out of range")))?;
        let page = self.doc.load_page(index)?;

        let scale = dpi / POINTS_PER_INCH;
        let transform = Matrix::new_scale(scale, scale);
        let rgb = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&transform, &rgb, false, false)?;

        let pixels = pixmap_to_rgb(&pixmap)?;
        Ok(RasterPage {
            pixels,
            width_px: pixmap.width(),
            height_px: pixmap.height(),
        })
    }
}

/// Copy pixmap samples into packed RGB, dropping alpha and row padding
fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, JobFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(JobFault::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(JobFault::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
