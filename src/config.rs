//! Studio configuration: JSON file plus environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::{ChannelCredentials, TextEngineSettings};
use crate::error::ConfigError;
use crate::history::MAX_HISTORY;
use crate::poll::PollPolicy;

pub const ENV_BASE_URL: &str = "STARNARRATOR_BASE_URL";
pub const ENV_TOKEN: &str = "STARNARRATOR_TOKEN";
pub const ENV_LLM_BASE_URL: &str = "STARNARRATOR_LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "STARNARRATOR_LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "STARNARRATOR_LLM_MODEL";

/// Model ids used for image generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    /// Task-based generation model
    pub standard_image: String,
    /// Chat-completion multimodal model
    pub pro_image: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            standard_image: "nano-banana".to_string(),
            pro_image: "gemini-3-pro-image-preview".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingConfig {
    pub image_interval_ms: u64,
    pub video_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_times: usize,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            image_interval_ms: 3_000,
            video_interval_ms: 5_000,
            max_attempts: 200,
            retry_times: 4,
            retry_min_delay_ms: 500,
            retry_max_delay_ms: 8_000,
        }
    }
}

impl PollingConfig {
    fn policy(&self, interval_ms: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(interval_ms),
            max_attempts: self.max_attempts,
            retry_times: self.retry_times,
            retry_min_delay: Duration::from_millis(self.retry_min_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn image_policy(&self) -> PollPolicy {
        self.policy(self.image_interval_ms)
    }

    pub fn video_policy(&self) -> PollPolicy {
        self.policy(self.video_interval_ms)
    }
}

/// Everything the engine and CLI need to talk to the backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    pub channel: ChannelCredentials,
    pub text_engine: TextEngineSettings,
    pub models: ModelConfig,
    pub polling: PollingConfig,
    pub history_limit: usize,
    /// Default workflow file, the local-storage stand-in
    pub workflow_path: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            channel: ChannelCredentials::default(),
            text_engine: TextEngineSettings::default(),
            models: ModelConfig::default(),
            polling: PollingConfig::default(),
            history_limit: MAX_HISTORY,
            workflow_path: PathBuf::from("sora-canvas-storage.json"),
        }
    }
}

impl StudioConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// File (if any) with environment overrides applied on top
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from `lookup` (the process environment in practice)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                log::debug!("Config override from {}", key);
                *target = value;
            }
        };
        set(&mut self.channel.base_url, ENV_BASE_URL);
        set(&mut self.channel.token, ENV_TOKEN);
        set(&mut self.text_engine.base_url, ENV_LLM_BASE_URL);
        set(&mut self.text_engine.api_key, ENV_LLM_API_KEY);
        set(&mut self.text_engine.model, ENV_LLM_MODEL);
    }
}
