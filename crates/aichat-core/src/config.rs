use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{ChatError, ChatResult};

pub const DEFAULT_MODEL: &str = "deepseek-chat";

const VISION_KEYWORDS: &[&str] = &[
    "vision", "vl", "visual", "multimodal", "mm",
    "4o", "gpt-4-turbo", "gpt-4-vision",
    "claude-3", "claude-3.5",
    "gemini", "qwen-vl", "glm-4v", "deepseek-vl",
    "llava", "cogvlm", "internvl", "yi-vl",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key must not be empty")]
    MissingApiKey,

    #[error("Base URL must not be empty")]
    MissingBaseUrl,

    #[error("Base URL is invalid, enter a full URL such as https://api.example.com/v1 ({0})")]
    InvalidBaseUrl(String),

    #[error("Model name must not be empty")]
    MissingModel,

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// What is stored in `config.json`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub supports_vision: bool,
    #[serde(default)]
    pub skip_vision_warning: bool,
    pub system_prompt: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> ChatResult<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> ChatResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> ChatResult<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> ChatResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ChatError::Config(ConfigError::NoConfigDir))?;

        Ok(config_dir.join("aichat").join("config.json"))
    }
}

/// Where the API key in use came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Env,
    Config,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Env => "env",
            KeySource::Config => "config",
        }
    }
}

/// Resolved settings the session runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub supports_vision: bool,
    pub skip_vision_warning: bool,
    pub system_prompt: Option<String>,
    key_source: Option<KeySource>,
    /// Key as stored in the file; an env key is never written back
    file_api_key: Option<String>,
}

impl Settings {
    /// Resolve settings from the environment first, then the config file
    pub fn resolve(config: &Config) -> Self {
        Self::resolve_with(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with(config: &Config, env: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let env_key = non_empty(env("AICHAT_API_KEY")).or_else(|| non_empty(env("OPENAI_API_KEY")));
        let (api_key, key_source) = match env_key {
            Some(key) => (key, Some(KeySource::Env)),
            None => match non_empty(config.api_key.clone()) {
                Some(key) => (key, Some(KeySource::Config)),
                None => (String::new(), None),
            },
        };

        let base_url = non_empty(env("AICHAT_BASE_URL"))
            .or_else(|| config.base_url.clone())
            .unwrap_or_default();
        let model = non_empty(env("AICHAT_MODEL"))
            .or_else(|| non_empty(config.model.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            api_key,
            base_url,
            model,
            supports_vision: config.supports_vision,
            skip_vision_warning: config.skip_vision_warning,
            system_prompt: non_empty(config.system_prompt.clone()),
            key_source,
            file_api_key: non_empty(config.api_key.clone()),
        }
    }

    pub fn api_key_source(&self) -> Option<KeySource> {
        self.key_source
    }

    /// Replace the user-editable fields, as the settings dialog does
    pub fn apply_edit(
        &mut self,
        api_key: &str,
        base_url: &str,
        model: &str,
        system_prompt: &str,
        supports_vision: bool,
    ) {
        let api_key = api_key.trim();
        if api_key != self.api_key {
            self.file_api_key = Some(api_key.to_string()).filter(|k| !k.is_empty());
            self.key_source = self.file_api_key.as_ref().map(|_| KeySource::Config);
        }
        self.api_key = api_key.to_string();
        self.base_url = base_url.trim().to_string();
        self.model = model.trim().to_string();
        self.system_prompt = Some(system_prompt.trim().to_string()).filter(|s| !s.is_empty());
        self.supports_vision = supports_vision;
    }

    /// Write the persistent subset back into a config
    pub fn to_config(&self) -> Config {
        let opt = |s: &str| Some(s.to_string()).filter(|s| !s.is_empty());
        Config {
            api_key: self.file_api_key.clone(),
            base_url: opt(&self.base_url),
            model: opt(&self.model),
            supports_vision: self.supports_vision,
            skip_vision_warning: self.skip_vision_warning,
            system_prompt: self.system_prompt.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        match url::Url::parse(base_url) {
            Ok(parsed) => {
                if parsed.scheme().is_empty() || parsed.host_str().map_or(true, str::is_empty) {
                    return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
                }
            }
            Err(e) => return Err(ConfigError::InvalidBaseUrl(e.to_string())),
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        Ok(())
    }

    /// Whether the model is expected to accept image input. The manual flag
    /// wins; otherwise the model name is matched against known families.
    pub fn supports_images(&self) -> bool {
        if self.supports_vision {
            return true;
        }
        let model = self.model.to_lowercase();
        VISION_KEYWORDS.iter().any(|kw| model.contains(kw))
    }
}
