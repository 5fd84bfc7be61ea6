use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_STORE_PATH: &str = "~/.local/share/rainbox-anchors/anchors.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("click_threshold must be a positive number of pixels, got {0}")]
    InvalidClickThreshold(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON file holding every confirmed anchor
    pub store_path: PathBuf,
    pub highlight: HighlightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            highlight: HighlightConfig::default(),
        }
    }
}

/// How highlights are painted and how clicks on them are told apart from drags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub tag: String,
    pub class: String,
    pub indicator_class: String,
    pub click_threshold: f64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            tag: "mark".to_string(),
            class: "rainbox-highlight".to_string(),
            indicator_class: "rainbox-annotation-indicator".to_string(),
            click_threshold: 5.0,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.validated().map(Some)
    }

    /// Load the user's config, falling back to defaults when there is none
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::load_from_path(Self::config_path())?;
        Ok(config.unwrap_or_default().expanded())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/rainbox-anchors");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Expand shell variables and tilde in `store_path`; left as written when
    /// a variable is unset
    pub fn expanded(mut self) -> Self {
        self.store_path = Self::expand_path(&self.store_path).unwrap_or(self.store_path);
        self
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let threshold = self.highlight.click_threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ConfigError::InvalidClickThreshold(threshold));
        }
        Ok(self)
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
