use ergot_shared::Language;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::preprocess::ChannelOrder;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Worker thread count; actix picks one per core when unset.
    pub workers: Option<usize>,
    pub static_dir: PathBuf,
    pub uploads_subdir: String,
    pub max_upload_bytes: usize,
    pub default_language: Language,
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub channel_order: ChannelOrder,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: None,
            static_dir: PathBuf::from("static"),
            uploads_subdir: "uploads".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            default_language: Language::En,
            model: ModelConfig::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pearl_millet_ergot_model.pt"),
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file named by `ERGOT_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match env::var("ERGOT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_value("PORT", port)?;
        }
        if let Some(workers) = lookup("WORKERS") {
            self.workers = Some(parse_value("WORKERS", workers)?);
        }
        if let Some(model_path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(model_path);
        }
        if let Some(static_dir) = lookup("STATIC_DIR") {
            self.static_dir = PathBuf::from(static_dir);
        }
        if let Some(max) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_value("MAX_UPLOAD_BYTES", max)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_upload_bytes",
                value: "0".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                value: "0".to_string(),
            });
        }
        let subdir = Path::new(&self.uploads_subdir);
        if self.uploads_subdir.is_empty()
            || subdir.is_absolute()
            || subdir.components().count() != 1
            || self.uploads_subdir.starts_with('.')
        {
            return Err(ConfigError::InvalidValue {
                key: "uploads_subdir",
                value: self.uploads_subdir.clone(),
            });
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.static_dir.join(&self.uploads_subdir)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
