use crate::backend::BackendKind;
use crate::color::{LayerColors, RgbaColor};
use crate::errors::{HistogramError, Result};
use crate::histogram::DEFAULT_BUFFER_POOL_SIZE;
use crate::pipeline::PipelineConfig;
use crate::types::{BinsCount, EnabledLayers};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Binning
    pub bins_count: BinsCount,
    pub is_linear: bool,

    // Overlay
    pub enabled_layers: EnabledLayers,
    pub colors: LayerColors,
    pub background: RgbaColor,
    pub overlay_width: u32,
    pub overlay_height: u32,

    // Execution
    pub backend: BackendKind,
    pub buffer_pool_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bins_count: BinsCount::default(),
            is_linear: false,

            enabled_layers: EnabledLayers::ALL,
            colors: LayerColors::default().with_opacity(0.5),
            background: RgbaColor::TRANSPARENT,
            overlay_width: 512,
            overlay_height: 256,

            backend: BackendKind::Auto,
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE.get(),
        }
    }
}

impl Settings {
    /// Location of the per-user settings file, if the platform has a config directory.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "histoview", "HistoView")
            .map(|proj_dirs| proj_dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads the per-user settings, falling back to defaults when the file is missing or invalid.
    pub fn load() -> Self {
        let Some(config_path) = Self::config_path() else {
            return Self::default();
        };
        if !config_path.exists() {
            return Self::default();
        }

        match Self::load_from(&config_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "ignoring invalid settings file");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path().ok_or_else(|| HistogramError::Settings {
            message: "no configuration directory on this platform".to_string(),
        })?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Rejects values that deserialize but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.overlay_width == 0 || self.overlay_height == 0 {
            return Err(HistogramError::Settings {
                message: format!(
                    "overlay size must be non-zero, got {}x{}",
                    self.overlay_width, self.overlay_height
                ),
            });
        }
        if self.buffer_pool_size == 0 {
            return Err(HistogramError::InvalidPoolSize {
                size: self.buffer_pool_size,
            });
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            bins: self.bins_count,
            is_linear: self.is_linear,
            colors: self.colors,
        }
    }
}
