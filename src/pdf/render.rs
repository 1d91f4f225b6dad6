//! Document access: opening PDFs and rasterizing pages

use std::path::Path;

use super::request::JobFault;
use super::types::RasterPage;

/// An open document
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Rasterize a zero-based page at `dpi` dots per inch
    fn render_page(&self, page_index: usize, dpi: f32) -> Result<RasterPage, JobFault>;
}

/// Opens documents by path.
///
/// Shared by reference across a document's workers; each worker opens
/// its own handle, so the handle type needs no thread-safety of its own.
pub trait DocumentLoader: Sync {
    type Document: PageSource;

    fn open(&self, path: &Path) -> Result<Self::Document, JobFault>;
}
