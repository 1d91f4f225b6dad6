//! Page selection: which pages of a document get extracted

use std::num::NonZeroU32;

use super::request::ConfigError;

/// Selection mode as chosen by the user, before any numbers are parsed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    SinglePage,
    Range,
    Whole,
    BatchWhole,
}

/// Validated page selection.
///
/// Page numbers are 1-based here, as the user typed them. [`resolve`]
/// converts them to 0-based indices for a concrete document.
///
/// [`resolve`]: SelectionSpec::resolve
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionSpec {
    SinglePage(NonZeroU32),
    Range { start: NonZeroU32, end: NonZeroU32 },
    Whole,
    /// Every page of every document, one output subdirectory per document
    BatchWhole,
}

impl SelectionSpec {
    /// Build a selection from a mode and the raw page input.
    ///
    /// Single page expects a positive integer, range expects `start-end`.
    /// Whole and batch modes ignore the input.
    pub fn parse(mode: SelectionMode, input: Option<&str>) -> Result<Self, ConfigError> {
        let raw = input.unwrap_or("").trim();
        match mode {
            SelectionMode::SinglePage => parse_positive(raw)
                .map(Self::SinglePage)
                .ok_or_else(|| ConfigError::InvalidPage(raw.to_string())),
            SelectionMode::Range => {
                let invalid = || ConfigError::InvalidRange(raw.to_string());
                let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
                let start = parse_positive(start.trim()).ok_or_else(invalid)?;
                let end = parse_positive(end.trim()).ok_or_else(invalid)?;
                let spec = Self::Range { start, end };
                spec.validate()?;
                Ok(spec)
            }
            SelectionMode::Whole => Ok(Self::Whole),
            SelectionMode::BatchWhole => Ok(Self::BatchWhole),
        }
    }

    /// Reject selections that can never be satisfied by construction
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Range { start, end } if start > end => {
                Err(ConfigError::InvalidRange(format!("{start}-{end}")))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> SelectionMode {
        match self {
            Self::SinglePage(_) => SelectionMode::SinglePage,
            Self::Range { .. } => SelectionMode::Range,
            Self::Whole => SelectionMode::Whole,
            Self::BatchWhole => SelectionMode::BatchWhole,
        }
    }

    /// Whether each document gets its own output subdirectory
    #[must_use]
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::BatchWhole)
    }

    /// Zero-based page indices to extract from a document with
    /// `page_count` pages, strictly increasing.
    ///
    /// Out-of-range pages are dropped, never reported as errors.
    #[must_use]
    pub fn resolve(&self, page_count: usize) -> Vec<usize> {
        match *self {
            Self::SinglePage(page) => {
                let index = page.get() as usize - 1;
                if index < page_count {
                    vec![index]
                } else {
                    Vec::new()
                }
            }
            Self::Range { start, end } => {
                let first = start.get() as usize - 1;
                let past_last = (end.get() as usize).min(page_count);
                (first..past_last).collect()
            }
            Self::Whole | Self::BatchWhole => (0..page_count).collect(),
        }
    }
}

fn parse_positive(raw: &str) -> Option<NonZeroU32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<NonZeroU32>().ok()
}
