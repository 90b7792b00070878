//! HTTP implementations of the generation and text adapters

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::adapters::{
    ChannelCredentials, ImageGenerator, ImageOptions, ImageTask, ResponseFormat, TaskStatus,
    TextEngine, TextEngineSettings, VideoGenerator, VideoOptions, VideoTask,
};
use crate::error::AdapterError;

/// OpenAI-compatible gateway for images, videos and chat
#[derive(Clone)]
pub struct HttpGateway {
    http: Client,
}

impl HttpGateway {
    pub fn new() -> Result<Self, AdapterError> {
        let http = Client::builder().build()?;
        Ok(Self { http })
    }

    fn headers(token: &str) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|err| AdapterError::Rejected(format!("invalid token: {}", err)))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn url(base_url: &str, path: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json<T, R>(&self, base_url: &str, token: &str, path: &str, body: &T) -> Result<R, AdapterError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self
            .http
            .post(Self::url(base_url, path))
            .headers(Self::headers(token)?)
            .json(body);
        Self::send(request).await
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        base_url: &str,
        token: &str,
        path: &str,
    ) -> Result<R, AdapterError> {
        let request = self
            .http
            .get(Self::url(base_url, path))
            .headers(Self::headers(token)?);
        Self::send(request).await
    }

    async fn send<R: DeserializeOwned>(request: RequestBuilder) -> Result<R, AdapterError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| AdapterError::Decode(err.to_string()))
    }
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    aspect_ratio: &'a str,
    resolution: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct TaskCreated {
    task_id: Option<String>,
    id: Option<String>,
}

#[derive(Deserialize)]
struct ImageTaskBody {
    #[serde(default)]
    status: String,
    result_url: Option<String>,
    #[serde(default)]
    result_urls: Vec<String>,
    fail_reason: Option<String>,
}

#[derive(Serialize)]
struct VideoRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    character_source_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamps: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct VideoTaskBody {
    #[serde(default)]
    status: String,
    progress: Option<Value>,
    #[serde(alias = "url")]
    video_url: Option<String>,
    #[serde(alias = "thumbnail_url")]
    cover_url: Option<String>,
    #[serde(alias = "error")]
    fail_reason: Option<Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Value,
}

impl ChatResponse {
    fn into_content(self) -> Result<Value, AdapterError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AdapterError::Decode("chat response has no choices".to_string()))
    }
}

fn task_id(created: TaskCreated) -> Result<String, AdapterError> {
    let TaskCreated { task_id, id } = created;
    task_id
        .filter(|id| !id.is_empty())
        .or(id.filter(|id| !id.is_empty()))
        .ok_or_else(|| AdapterError::Rejected("no task id in response".to_string()))
}

/// Progress may arrive as a number or a string like `"45%"`
fn parse_progress(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|p| p as f32),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn reason_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_string()),
            None => Some(Value::Object(map).to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Flatten chat content: plain string or an array of content parts
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        part.get("image_url")
                            .and_then(|img| img.get("url").or(Some(img)))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Image URLs in assistant text, in order and without duplicates.
///
/// Markdown image targets and `data:image/...` URLs are taken first; bare
/// http(s) URLs only count when the text has neither.
pub fn extract_image_urls(text: &str) -> Vec<String> {
    fn clean(url: &str) -> &str {
        url.trim()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | '"' | '\''))
    }
    fn is_web(url: &str) -> bool {
        url.starts_with("http://") || url.starts_with("https://")
    }
    fn push(urls: &mut Vec<String>, url: &str) {
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }

    let mut urls = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("![") {
        let after = &rest[start + 2..];
        let Some(open) = after.find("](") else {
            break;
        };
        let target = &after[open + 2..];
        let Some(close) = target.find(')') else {
            break;
        };
        let url = clean(&target[..close]);
        if is_web(url) || url.starts_with("data:image/") {
            push(&mut urls, url);
        }
        rest = &target[close + 1..];
    }

    let tokens = || {
        text.split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>' | '[' | ']'))
            .map(clean)
    };
    for token in tokens().filter(|t| t.starts_with("data:image/")) {
        push(&mut urls, token);
    }
    if urls.is_empty() {
        for token in tokens().filter(|t| is_web(t)) {
            push(&mut urls, token);
        }
    }
    urls
}

#[async_trait]
impl ImageGenerator for HttpGateway {
    async fn submit(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &ImageOptions,
    ) -> Result<String, AdapterError> {
        let request = ImageRequest {
            prompt,
            model,
            aspect_ratio: &options.aspect_ratio,
            resolution: &options.resolution,
            seed: options.seed,
        };
        let created: TaskCreated = self
            .post_json(&channel.base_url, &channel.token, "v1/images/generations", &request)
            .await?;
        let id = task_id(created)?;
        log::debug!("Image task {} submitted", id);
        Ok(id)
    }

    async fn poll(&self, channel: &ChannelCredentials, task_id: &str) -> Result<ImageTask, AdapterError> {
        let body: ImageTaskBody = self
            .get_json(
                &channel.base_url,
                &channel.token,
                &format!("v1/images/tasks/{}", task_id),
            )
            .await?;
        Ok(ImageTask {
            status: TaskStatus::parse(&body.status),
            result_url: body.result_url.filter(|u| !u.is_empty()),
            result_urls: body.result_urls,
            fail_reason: body.fail_reason,
        })
    }

    async fn generate_immediate(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        references: &[String],
        options: &ImageOptions,
    ) -> Result<Vec<String>, AdapterError> {
        let mut parts = vec![json!({
            "type": "text",
            "text": format!(
                "{}\n\nAspect ratio: {}. Resolution: {}.",
                prompt, options.aspect_ratio, options.resolution
            ),
        })];
        parts.extend(references.iter().map(|url| {
            json!({ "type": "image_url", "image_url": { "url": url } })
        }));
        let mut request = json!({
            "model": model,
            "messages": [{ "role": "user", "content": parts }],
        });
        if let Some(seed) = options.seed {
            request["seed"] = json!(seed);
        }

        let response: ChatResponse = self
            .post_json(&channel.base_url, &channel.token, "v1/chat/completions", &request)
            .await?;
        let urls = extract_image_urls(&content_text(&response.into_content()?));
        if urls.is_empty() {
            return Err(AdapterError::Decode(
                "no image url in model response".to_string(),
            ));
        }
        Ok(urls)
    }
}

#[async_trait]
impl VideoGenerator for HttpGateway {
    async fn submit(
        &self,
        channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &VideoOptions,
    ) -> Result<String, AdapterError> {
        let request = VideoRequest {
            prompt,
            model,
            character_source_id: options.character_source_id.as_deref(),
            timestamps: options.timestamps.as_deref(),
            seed: options.seed,
        };
        let created: TaskCreated = self
            .post_json(&channel.base_url, &channel.token, "v1/videos", &request)
            .await?;
        let id = task_id(created)?;
        log::debug!("Video task {} submitted with {}", id, model);
        Ok(id)
    }

    async fn poll(&self, channel: &ChannelCredentials, task_id: &str) -> Result<VideoTask, AdapterError> {
        let body: VideoTaskBody = self
            .get_json(
                &channel.base_url,
                &channel.token,
                &format!("v1/videos/{}", task_id),
            )
            .await?;
        Ok(VideoTask {
            status: TaskStatus::parse(&body.status),
            progress: body.progress.as_ref().and_then(parse_progress),
            video_url: body.video_url.filter(|u| !u.is_empty()),
            cover_url: body.cover_url.filter(|u| !u.is_empty()),
            fail_reason: body.fail_reason.and_then(reason_text),
        })
    }
}

#[async_trait]
impl TextEngine for HttpGateway {
    async fn chat(
        &self,
        settings: &TextEngineSettings,
        system_prompt: &str,
        user_prompt: &str,
        format: &ResponseFormat,
    ) -> Result<String, AdapterError> {
        let mut request = json!({
            "model": settings.model,
            "max_tokens": settings.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });
        if let ResponseFormat::JsonSchema { name, schema } = format {
            request["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema, "strict": true },
            });
        }

        let response: ChatResponse = self
            .post_json(&settings.base_url, &settings.api_key, "v1/chat/completions", &request)
            .await?;
        let text = content_text(&response.into_content()?);
        if text.trim().is_empty() {
            return Err(AdapterError::Decode("empty chat completion".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_and_data_urls_win_over_bare_links() {
        let text = "Here you go: ![frame](https://cdn.test/a.png)\n\
                    see https://docs.test/usage for terms.\n\
                    inline data:image/png;base64,AAAA";
        assert_eq!(
            extract_image_urls(text),
            vec!["https://cdn.test/a.png", "data:image/png;base64,AAAA"]
        );
        assert!(extract_image_urls("no pictures today").is_empty());
    }

    #[test]
    fn bare_urls_are_the_fallback() {
        assert_eq!(
            extract_image_urls("Saved to https://cdn.test/b.jpg. Enjoy"),
            vec!["https://cdn.test/b.jpg"]
        );
        // a plain markdown link is not an image target
        assert_eq!(
            extract_image_urls("[docs](https://docs.test/) ![](https://cdn.test/c.png)"),
            vec!["https://cdn.test/c.png"]
        );
    }

    #[test]
    fn task_id_prefers_task_id_over_id() {
        let both: TaskCreated =
            serde_json::from_value(json!({"id": "req-1", "task_id": "task-9"})).unwrap();
        assert_eq!(task_id(both).unwrap(), "task-9");
        let only_id: TaskCreated = serde_json::from_value(json!({"id": "vid-7"})).unwrap();
        assert_eq!(task_id(only_id).unwrap(), "vid-7");
        let blank: TaskCreated =
            serde_json::from_value(json!({"task_id": "", "id": "vid-8"})).unwrap();
        assert_eq!(task_id(blank).unwrap(), "vid-8");
        let neither: TaskCreated = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert!(matches!(task_id(neither), Err(AdapterError::Rejected(_))));
    }

    #[test]
    fn progress_strings_and_numbers() {
        assert_eq!(parse_progress(&json!(0.4)), Some(0.4));
        assert_eq!(parse_progress(&json!("45%")), Some(45.0));
        assert_eq!(parse_progress(&json!(null)), None);
    }

    #[test]
    fn content_parts_are_flattened() {
        let content = json!([
            { "type": "text", "text": "done" },
            { "type": "image_url", "image_url": { "url": "https://cdn.test/c.png" } }
        ]);
        assert_eq!(content_text(&content), "done\nhttps://cdn.test/c.png");
    }

    #[test]
    fn base_urls_are_joined_once() {
        assert_eq!(
            HttpGateway::url("https://gen.test/", "/v1/videos"),
            "https://gen.test/v1/videos"
        );
    }
}
