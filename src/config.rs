use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bot::images::ImageParams;
use crate::bot::persona::{Persona, Personas};

const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
const DEFAULT_CHAT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free";
const DEFAULT_IMAGE_MODEL: &str = "black-forest-labs/FLUX.1-schnell-Free";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp-image-generation";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// An environment variable had an unusable value.
    InvalidEnv { var: &'static str, value: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidEnv { var, value } => {
                write!(f, "invalid value for {}: '{}'", var, value)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidEnv { .. } | Self::Validation(_) => None,
        }
    }
}

/// Which generation strategy the bot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Chat completion.
    #[default]
    Text,
    /// Text-to-image.
    Image,
    /// Image editing with a multimodal model.
    Edit,
}

impl Mode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "edit" => Some(Self::Edit),
            _ => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    mode: Option<Mode>,
    /// Key for the chat completion API.
    #[serde(default)]
    openai_api_key: String,
    base_url: Option<String>,
    chat_model: Option<String>,
    /// Key for the image API. Defaults to `openai_api_key`.
    image_api_key: Option<String>,
    image_base_url: Option<String>,
    image_model: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    image_steps: Option<u32>,
    image_seed: Option<u64>,
    #[serde(default)]
    gemini_api_key: String,
    gemini_base_url: Option<String>,
    gemini_model: Option<String>,
    port: Option<u16>,
    /// Directory for state files (logs, scratch). Defaults to current directory.
    data_dir: Option<String>,
    scratch_dir: Option<String>,
    log_chat_id: Option<i64>,
    request_timeout_secs: Option<u64>,
    persona: Option<Persona>,
    #[serde(default)]
    personas_by_username: HashMap<String, Persona>,
}

#[derive(Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub mode: Mode,
    pub openai_api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub image_api_key: String,
    pub image_base_url: String,
    pub image_model: String,
    pub image_params: ImageParams,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    /// Port of the liveness HTTP server.
    pub port: u16,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    /// Directory for transient images.
    pub scratch_dir: PathBuf,
    /// Chat that receives a copy of the logs.
    pub log_chat_id: Option<i64>,
    pub request_timeout: Duration,
    pub personas: Personas,
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides.
    ///
    /// A missing file is not an error; every setting can come from the
    /// environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = read_file(path.as_ref())?;
        Self::from_sources(file, |var| std::env::var(var).ok())
    }

    fn from_sources<F>(file: Option<ConfigFile>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = file.unwrap_or_default();
        // Empty variables count as unset.
        let env = |var: &str| env(var).filter(|v| !v.trim().is_empty());

        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN").unwrap_or(file.telegram_bot_token);
        let mode = match env("BOT_MODE") {
            Some(value) => Mode::parse(&value)
                .ok_or(ConfigError::InvalidEnv { var: "BOT_MODE", value })?,
            None => file.mode.unwrap_or_default(),
        };
        let port: u16 = match env("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "PORT", value })?,
            None => file.port.unwrap_or(3000),
        };
        let log_chat_id: Option<i64> = match env("LOG_CHAT_ID") {
            Some(value) => Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { var: "LOG_CHAT_ID", value })?,
            ),
            None => file.log_chat_id,
        };

        let openai_api_key = env("OPENAI_API_KEY").unwrap_or(file.openai_api_key);
        let base_url = env("BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let chat_model = env("CHAT_MODEL")
            .or(file.chat_model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let image_api_key = env("IMAGE_API_KEY")
            .or(file.image_api_key)
            .unwrap_or_else(|| openai_api_key.clone());
        let image_base_url = env("IMAGE_BASE_URL")
            .or(file.image_base_url)
            .unwrap_or_else(|| base_url.clone());
        let image_model = env("IMAGE_MODEL")
            .or(file.image_model)
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let defaults = ImageParams::default();
        let image_params = ImageParams {
            width: file.image_width.unwrap_or(defaults.width),
            height: file.image_height.unwrap_or(defaults.height),
            steps: file.image_steps.unwrap_or(defaults.steps),
            seed: file.image_seed,
            output_format: defaults.output_format,
        };

        let gemini_api_key = env("GEMINI_API_KEY").unwrap_or(file.gemini_api_key);
        let gemini_base_url = env("GEMINI_BASE_URL")
            .or(file.gemini_base_url)
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        let gemini_model = env("GEMINI_MODEL")
            .or(file.gemini_model)
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let data_dir = env("DATA_DIR")
            .or(file.data_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let scratch_dir = env("SCRATCH_DIR")
            .or(file.scratch_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("scratch"));

        // Validate required fields
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        match mode {
            Mode::Text if openai_api_key.is_empty() => {
                return Err(ConfigError::Validation("openai_api_key is required in text mode".into()));
            }
            Mode::Image if image_api_key.is_empty() => {
                return Err(ConfigError::Validation("image_api_key is required in image mode".into()));
            }
            Mode::Edit if gemini_api_key.is_empty() => {
                return Err(ConfigError::Validation("gemini_api_key is required in edit mode".into()));
            }
            _ => {}
        }

        let request_timeout = Duration::from_secs(file.request_timeout_secs.unwrap_or(120));
        if request_timeout.is_zero() {
            return Err(ConfigError::Validation("request_timeout_secs must be positive".into()));
        }

        Ok(Self {
            telegram_bot_token,
            mode,
            openai_api_key,
            base_url,
            chat_model,
            image_api_key,
            image_base_url,
            image_model,
            image_params,
            gemini_api_key,
            gemini_base_url,
            gemini_model,
            port,
            data_dir,
            scratch_dir,
            log_chat_id,
            request_timeout,
            personas: Personas::new(file.persona.unwrap_or_default(), file.personas_by_username),
        })
    }
}

fn read_file(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
    let file = serde_json::from_str(&content)
        .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })?;
    Ok(Some(file))
}
