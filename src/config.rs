use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Application settings, read from `config.yml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where the notes blob lives; overrides project/global discovery.
    pub data_dir: Option<PathBuf>,
    /// Idle time after the last keystroke before the editor commits.
    pub autosave_idle_ms: u64,
    pub ai: AiConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key. The key
    /// itself is read on every request, never stored.
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: None,
            autosave_idle_ms: 1000,
            ai: AiConfig::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

impl Config {
    /// Loads `path` (or the per-user default). A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(p) => p,
            None => return Ok(Config::default().with_env_overrides()),
        };
        if !path.exists() {
            return Ok(Config::default().with_env_overrides());
        }
        let data = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })?;
        Ok(config.with_env_overrides())
    }

    pub fn autosave_idle(&self) -> Duration {
        Duration::from_millis(self.autosave_idle_ms)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("CYBERNOTES_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(model) = std::env::var("CYBERNOTES_AI_MODEL") {
            if !model.trim().is_empty() {
                self.ai.model = model;
            }
        }
        self
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cybernotes").map(|dirs| dirs.config_dir().join("config.yml"))
}
