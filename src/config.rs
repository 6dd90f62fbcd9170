use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_autosave_interval_seconds")]
    pub autosave_interval_seconds: u64,

    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    #[serde(default = "default_saved_display_ms")]
    pub saved_display_ms: u64,

    #[serde(default = "default_error_display_ms")]
    pub error_display_ms: u64,

    #[serde(default = "default_analysis_min_chars")]
    pub analysis_min_chars: usize,

    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_autosave_interval_seconds() -> u64 {
    30
}

fn default_autosave_debounce_ms() -> u64 {
    2000
}

fn default_saved_display_ms() -> u64 {
    2000
}

fn default_error_display_ms() -> u64 {
    5000
}

fn default_analysis_min_chars() -> usize {
    120
}

fn default_analysis_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_analysis_max_tokens() -> u32 {
    150
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribex")
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            autosave_interval_seconds: default_autosave_interval_seconds(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            saved_display_ms: default_saved_display_ms(),
            error_display_ms: default_error_display_ms(),
            analysis_min_chars: default_analysis_min_chars(),
            analysis_model: default_analysis_model(),
            analysis_max_tokens: default_analysis_max_tokens(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the config file, writing one with defaults if it is missing.
    pub fn load() -> Self {
        let config_path = Self::config_path();

        match fs::read_to_string(&config_path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => {
                let default_config = Self::default();
                if let Err(e) = default_config.save() {
                    warn!(error = %e, "could not create default config file");
                }
                default_config
            }
        }
    }

    /// Parse TOML, falling back to defaults when it is invalid.
    pub fn parse(contents: &str) -> Self {
        let mut config: Config = toml::from_str(contents).unwrap_or_else(|e| {
            warn!(error = %e, "error parsing config file, using defaults");
            Self::default()
        });

        if config.data_dir.starts_with('~') {
            if let Some(home) = dirs::home_dir() {
                config.data_dir = config.data_dir.replacen('~', &home.to_string_lossy(), 1);
            }
        }
        config
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| Error::Io {
            path: config_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        fs::write(&config_path, toml_string).map_err(|source| Error::Io {
            path: config_path,
            source,
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("scribex");
        path.push("config.toml");
        path
    }
}
