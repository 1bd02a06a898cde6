//! Pipeline Configuration
//!
//! Model, dictionary, preprocessing and backend settings stored in TOML format.
//! Relative paths inside a config file are resolved against the file's directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::storage;
use crate::vision::preprocess::{Resample, TensorLayout};

/// Recognition pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Recognition model and its input/output contract
    pub model: ModelConfig,
    /// Glyph dictionary
    pub dictionary: DictionaryConfig,
    /// Image preprocessing settings
    pub preprocess: PreprocessSettings,
    /// Inference backend settings
    pub backend: BackendConfig,
}

/// Recognition model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the model file
    pub path: PathBuf,
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Order in which channel values are laid out in the input tensor
    pub layout: TensorLayout,
    /// Expected number of output time steps, when the model pins it
    pub time_steps: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rec.onnx"),
            input_width: 320,
            input_height: 32,
            layout: TensorLayout::Interleaved,
            time_steps: None,
        }
    }
}

/// Glyph dictionary settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Dictionary file (`.txt` one glyph per line, or `.json` array)
    pub path: Option<PathBuf>,
    /// Insert the blank class at index 0 (files usually list glyphs only)
    pub prepend_blank: bool,
    /// Append a space glyph after the file's glyphs
    pub append_space: bool,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            path: None,
            prepend_blank: true,
            append_space: false,
        }
    }
}

/// Image preprocessing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Resampling policy used to reach the model resolution
    pub resample: Resample,
}

/// Inference backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Threads used inside a single inference run
    pub intra_threads: usize,
    /// Graph optimization level (0 = disabled, 3 = all)
    pub optimization_level: u8,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            optimization_level: 3,
        }
    }
}

impl OcrConfig {
    /// Make relative model and dictionary paths absolute against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.model.path.is_relative() {
            self.model.path = base.join(&self.model.path);
        }
        if let Some(dict) = self.dictionary.path.as_mut() {
            if dict.is_relative() {
                *dict = base.join(&*dict);
            }
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<OcrConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let mut config: OcrConfig =
        toml::from_str(&content).with_context(|| format!("Invalid config file {:?}", path))?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &OcrConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Location of the user's `config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(storage::get_config_dir()?.join("config.toml"))
}

/// Load the user's configuration, falling back to defaults rooted in the models directory
pub fn load_or_default() -> OcrConfig {
    if let Ok(config_path) = default_config_path() {
        if config_path.exists() {
            match load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring unreadable configuration: {:#}", e),
            }
        }
    }

    info!("Using default configuration");
    let mut config = OcrConfig::default();
    if let Ok(models_dir) = storage::get_models_dir() {
        config.resolve_paths(&models_dir);
    }
    config
}
