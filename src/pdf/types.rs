//! Core types for page extraction

use std::fmt;

/// Rendered page image before encoding.
///
/// Tightly packed RGB (3 bytes per pixel, no row padding). This is the
/// intermediate format between MuPDF rasterization and the image encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterPage {
    /// Raw RGB pixel data
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width_px: u32,
    /// Image height in pixels
    pub height_px: u32,
}

impl RasterPage {
    /// Bytes in one row of pixels
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.width_px as usize * 3
    }

    /// Whether the pixel buffer matches the declared dimensions
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.row_bytes() * self.height_px as usize
    }
}

/// Output image format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Lossless
    #[default]
    Png,
    /// Lossy, fixed high quality
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
        }
    }

    /// Lowercased format name, used as the file extension
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one run: pages processed out of pages planned
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Pages planned by the pre-scan; fixed afterwards
    pub total: usize,
    /// Pages processed so far, successful or not
    pub completed: usize,
}

impl ProgressState {
    #[must_use]
    pub const fn new(total: usize, completed: usize) -> Self {
        Self { total, completed }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Lifecycle of a single extraction run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    PreScanning,
    Executing,
    Completed,
    Cancelled,
}

impl RunPhase {
    /// Whether the run may move from `self` to `next`
    #[must_use]
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::PreScanning)
                | (RunPhase::PreScanning, RunPhase::Executing)
                | (RunPhase::PreScanning, RunPhase::Cancelled)
                | (RunPhase::Executing, RunPhase::Completed)
                | (RunPhase::Executing, RunPhase::Cancelled)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Cancelled)
    }
}
