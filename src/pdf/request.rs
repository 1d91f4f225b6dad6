//! Extraction request, job and outcome types

use std::path::PathBuf;

use super::selection::SelectionSpec;
use super::types::OutputFormat;

/// Everything a caller supplies to start a run
#[derive(Clone, Debug)]
pub struct ExtractionRequest {
    /// Documents in processing order
    pub documents: Vec<PathBuf>,
    /// Output root; created if missing
    pub output_dir: PathBuf,
    pub selection: SelectionSpec,
    pub format: OutputFormat,
    /// Best effort: silently falls back when no acceleration path exists
    pub accelerate: bool,
}

impl ExtractionRequest {
    /// Check the request before any document is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.documents.is_empty() || self.documents.iter().any(|d| d.as_os_str().is_empty()) {
            return Err(ConfigError::NoDocuments);
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::NoOutputDir);
        }
        self.selection.validate()
    }
}

/// Rejected run configuration. Reported before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no PDF documents selected")]
    NoDocuments,

    #[error("no output directory selected")]
    NoOutputDir,

    #[error("invalid page number {0:?}: expected a positive integer")]
    InvalidPage(String),

    #[error("invalid page range {0:?}: expected start-end with 1 <= start <= end")]
    InvalidRange(String),

    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-page and per-document failures inside a run
#[derive(Debug, thiserror::Error)]
pub enum JobFault {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("image encoding: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl JobFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// One page of one document.
///
/// The document handle itself belongs to the worker that runs the job.
#[derive(Clone, Debug)]
pub struct ExtractionJob {
    /// Zero-based page index
    pub page_index: usize,
    pub output_path: PathBuf,
    pub format: OutputFormat,
    pub accelerate: bool,
}

/// Result of one job
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Page written to the contained path
    Success(PathBuf),
    Failure(JobFault),
}

/// Message from a worker back to the driver
#[derive(Debug)]
pub struct JobCompletion {
    pub page_index: usize,
    pub outcome: ExtractionOutcome,
}

/// A page that could not be extracted
#[derive(Debug)]
pub struct PageFailure {
    pub document: PathBuf,
    /// 1-based page number
    pub page: usize,
    pub cause: JobFault,
}

/// A document that could not be opened or prepared
#[derive(Debug)]
pub struct DocumentFailure {
    pub document: PathBuf,
    pub cause: JobFault,
}
