use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::warn;
use regex::Regex;

// Invalid on Windows: < > : " / \ | ? * plus control characters (0-31)
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"));

static RESERVED_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid regex")
});

const MAX_NAME_CHARS: usize = 200;

/// Directory name for a document's pages in batch mode: the file stem,
/// sanitized
pub fn document_dir_name(document: &Path) -> String {
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    sanitize_filename(&stem)
}

/// Batch directory names for `documents`, in order. Names that collide
/// (ignoring case) get a `_2`, `_3`, ... suffix.
pub fn unique_dir_names(documents: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();
    documents
        .iter()
        .map(|document| {
            let base = document_dir_name(document);
            let mut name = base.clone();
            let mut suffix = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            if name != base {
                warn!(
                    "{} shares directory name {base:?}, writing to {name:?}",
                    document.display()
                );
            }
            name
        })
        .collect()
}

/// Sanitize a filename for cross-platform compatibility
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");

    // Leading/trailing spaces and dots are problematic on Windows
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    if RESERVED_NAMES.is_match(sanitized) {
        return format!("_{sanitized}");
    }

    let sanitized: String = sanitized.chars().take(MAX_NAME_CHARS).collect();

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}
