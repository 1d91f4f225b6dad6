//! PDF page extraction infrastructure

pub mod accel;
pub mod budget;
mod engine;
mod filename;
#[cfg(feature = "pdf")]
mod mupdf_doc;
mod progress;
mod render;
mod request;
mod selection;
mod types;
mod worker;
mod writer;

pub use engine::{EngineConfig, ExtractionEngine, RunReport};
pub use filename::{document_dir_name, sanitize_filename, unique_dir_names};
#[cfg(feature = "pdf")]
pub use mupdf_doc::{MupdfDocument, MupdfLoader};
pub use progress::{CancellationFlag, NullProgress, ProgressSink, SharedProgress};
pub use render::{DocumentLoader, PageSource};
pub use request::{
    ConfigError, DocumentFailure, ExtractionJob, ExtractionOutcome, ExtractionRequest,
    JobCompletion, JobFault, PageFailure,
};
pub use selection::{SelectionMode, SelectionSpec};
pub use types::*;
pub use writer::{ImageCrateWriter, ImageWriter, page_file_name};

/// Lowest render resolution the engine accepts
pub const MIN_DPI: f32 = 300.0;
pub const DEFAULT_DPI: f32 = MIN_DPI;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
