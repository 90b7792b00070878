//! Contracts of the remote generation services
//!
//! The engine only talks to these traits. [`crate::remote::HttpGateway`]
//! implements all three over HTTP; [`crate::mock::MockGateway`] scripts them
//! for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Endpoint + token of the image/video channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelCredentials {
    pub base_url: String,
    pub token: String,
}

impl ChannelCredentials {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.token.is_empty()
    }
}

/// Settings of the text / LLM engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextEngineSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for TextEngineSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
        }
    }
}

impl TextEngineSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Remote task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    /// Lenient mapping of the status strings different backends use
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "completed" | "complete" | "done" => Self::Success,
            "failed" | "failure" | "error" | "cancelled" | "canceled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOptions {
    pub aspect_ratio: String,
    pub resolution: String,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTask {
    pub status: TaskStatus,
    pub result_url: Option<String>,
    pub result_urls: Vec<String>,
    pub fail_reason: Option<String>,
}

impl ImageTask {
    pub fn first_url(&self) -> Option<&str> {
        self.result_url
            .as_deref()
            .or_else(|| self.result_urls.first().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoOptions {
    pub character_source_id: Option<String>,
    pub timestamps: Option<String>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTask {
    pub status: TaskStatus,
    /// As reported; may be a fraction or a percentage
    pub progress: Option<f32>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub fail_reason: Option<String>,
}

/// Report progress as 0-100: values in (0, 1] are treated as fractions
pub fn normalize_progress(raw: f32) -> f32 {
    let percent = if raw > 0.0 && raw <= 1.0 { raw * 100.0 } else { raw };
    percent.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Structured output constrained by a JSON schema
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Submit a generation task, returning its id
    async fn submit(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &ImageOptions,
    ) -> Result<String, AdapterError>;

    async fn poll(&self, channel: &ChannelCredentials, task_id: &str) -> Result<ImageTask, AdapterError>;

    /// Multimodal chat-completion generation; answers with image URLs directly
    async fn generate_immediate(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        references: &[String],
        options: &ImageOptions,
    ) -> Result<Vec<String>, AdapterError>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn submit(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &VideoOptions,
    ) -> Result<String, AdapterError>;

    async fn poll(&self, channel: &ChannelCredentials, task_id: &str) -> Result<VideoTask, AdapterError>;
}

#[async_trait]
pub trait TextEngine: Send + Sync {
    async fn chat(
        &self,
        settings: &TextEngineSettings,
        system_prompt: &str,
        user_prompt: &str,
        format: &ResponseFormat,
    ) -> Result<String, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_fractions_become_percentages() {
        assert_eq!(normalize_progress(0.5), 50.0);
        assert_eq!(normalize_progress(1.0), 100.0);
        assert_eq!(normalize_progress(0.0), 0.0);
        assert_eq!(normalize_progress(42.0), 42.0);
        assert_eq!(normalize_progress(250.0), 100.0);
    }

    #[test]
    fn status_strings_are_lenient() {
        assert_eq!(TaskStatus::parse("SUCCESS"), TaskStatus::Success);
        assert_eq!(TaskStatus::parse("failed"), TaskStatus::Failed);
        assert_eq!(TaskStatus::parse("in_progress"), TaskStatus::Pending);
    }

    #[test]
    fn first_url_prefers_single_result() {
        let task = ImageTask {
            status: TaskStatus::Success,
            result_url: None,
            result_urls: vec!["https://cdn.test/1.png".into()],
            fail_reason: None,
        };
        assert_eq!(task.first_url(), Some("https://cdn.test/1.png"));
    }
}
