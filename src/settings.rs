use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::pdf::budget::DEFAULT_WORKER_ALLOWANCE;
use crate::pdf::{DEFAULT_JPEG_QUALITY, EngineConfig, MIN_DPI};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagerip";

/// Observers never poll faster than this
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const SETTINGS_HEADER: &str = "\
# pagerip settings
#
# dpi: render resolution, at least 300
# jpeg_quality: 1-100, used for JPEG output
# per_worker_memory_mib: memory set aside per concurrent page worker
# max_workers: optional cap on workers per document
# progress_interval_ms: progress refresh cadence, at least 100
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_dpi")]
    pub dpi: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_per_worker_memory_mib")]
    pub per_worker_memory_mib: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_dpi() -> u32 {
    MIN_DPI as u32
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_per_worker_memory_mib() -> u64 {
    DEFAULT_WORKER_ALLOWANCE / (1024 * 1024)
}

fn default_progress_interval_ms() -> u64 {
    MIN_PROGRESS_INTERVAL.as_millis() as u64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            dpi: default_dpi(),
            jpeg_quality: default_jpeg_quality(),
            per_worker_memory_mib: default_per_worker_memory_mib(),
            max_workers: None,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }

    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms).max(MIN_PROGRESS_INTERVAL)
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dpi: (self.dpi as f32).max(MIN_DPI),
            per_worker_allowance: self.per_worker_memory_mib.max(1).saturating_mul(1024 * 1024),
            max_workers: self.max_workers,
        }
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Settings from `explicit`, else from the per-user config file.
///
/// A missing per-user file is created with defaults. Unreadable or
/// malformed files are logged and defaults are used.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    if let Some(path) = explicit {
        return load_or_default(path);
    }

    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return Settings::default();
    };

    if path.exists() {
        return load_or_default(&path);
    }

    info!("Settings file not found, creating with defaults at {path:?}");
    let settings = Settings::default();
    if let Err(e) = save_settings_to_file(&settings, &path) {
        error!("{e:#}");
    }
    settings
}

fn load_or_default(path: &Path) -> Settings {
    match load_settings_from_path(path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e:#}");
            Settings::default()
        }
    }
}

pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {path:?}"))?;
    let settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file {path:?}"))?;

    if settings.version > CURRENT_VERSION {
        warn!(
            "Settings file {path:?} is version {}, newer than supported v{CURRENT_VERSION}",
            settings.version
        );
    }
    debug!("Loaded settings from {path:?}");
    Ok(settings)
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {parent:?}"))?;
    }

    let body = serde_yaml::to_string(settings).context("Failed to serialize settings")?;
    fs::write(path, format!("{SETTINGS_HEADER}\n{body}"))
        .with_context(|| format!("Failed to save settings to {path:?}"))?;
    debug!("Saved settings to {path:?}");
    Ok(())
}
