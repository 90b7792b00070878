//! Scripted in-memory gateway for tests and offline runs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::adapters::{
    ChannelCredentials, ImageGenerator, ImageOptions, ImageTask, ResponseFormat, TaskStatus,
    TextEngine, TextEngineSettings, VideoGenerator, VideoOptions, VideoTask,
};
use crate::error::AdapterError;

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ImageSubmit {
        prompt: String,
        model: String,
        options: ImageOptions,
    },
    ImagePoll {
        task_id: String,
    },
    ImageImmediate {
        prompt: String,
        model: String,
        references: Vec<String>,
        options: ImageOptions,
    },
    VideoSubmit {
        prompt: String,
        model: String,
        options: VideoOptions,
    },
    VideoPoll {
        task_id: String,
    },
    Chat {
        system: String,
        user: String,
        format: ResponseFormat,
    },
}

impl MockCall {
    /// Prompt sent to a generation endpoint, if this was one
    pub fn generation_prompt(&self) -> Option<&str> {
        match self {
            Self::ImageSubmit { prompt, .. }
            | Self::ImageImmediate { prompt, .. }
            | Self::VideoSubmit { prompt, .. } => Some(prompt),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    image_submits: VecDeque<Result<String, AdapterError>>,
    image_polls: VecDeque<Result<ImageTask, AdapterError>>,
    immediate: VecDeque<Result<Vec<String>, AdapterError>>,
    video_submits: VecDeque<Result<String, AdapterError>>,
    video_polls: VecDeque<Result<VideoTask, AdapterError>>,
    chats: VecDeque<Result<String, AdapterError>>,
    /// Polls past the scripted queue stay pending instead of succeeding
    stalled: bool,
    calls: Vec<MockCall>,
    next_task: u32,
}

/// Answers from queues pushed by the test; falls back to instant success
#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Arc<Mutex<Inner>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_image_submit(&self, result: Result<String, AdapterError>) {
        self.lock().image_submits.push_back(result);
    }

    pub fn push_image_poll(&self, result: Result<ImageTask, AdapterError>) {
        self.lock().image_polls.push_back(result);
    }

    pub fn push_immediate(&self, result: Result<Vec<String>, AdapterError>) {
        self.lock().immediate.push_back(result);
    }

    pub fn push_video_submit(&self, result: Result<String, AdapterError>) {
        self.lock().video_submits.push_back(result);
    }

    pub fn push_video_poll(&self, result: Result<VideoTask, AdapterError>) {
        self.lock().video_polls.push_back(result);
    }

    pub fn push_chat(&self, result: Result<String, AdapterError>) {
        self.lock().chats.push_back(result);
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn generation_prompts(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(MockCall::generation_prompt)
            .map(str::to_string)
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::ImagePoll { .. } | MockCall::VideoPoll { .. }))
            .count()
    }

    fn record(&self, call: MockCall) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        inner.calls.push(call);
        inner
    }

    fn task_id(inner: &mut Inner, kind: &str) -> String {
        inner.next_task += 1;
        format!("{}-task-{}", kind, inner.next_task)
    }
}

pub fn pending_image() -> ImageTask {
    ImageTask {
        status: TaskStatus::Pending,
        result_url: None,
        result_urls: Vec::new(),
        fail_reason: None,
    }
}

pub fn finished_image(url: &str) -> ImageTask {
    ImageTask {
        status: TaskStatus::Success,
        result_url: Some(url.to_string()),
        ..pending_image()
    }
}

pub fn video_progress(progress: f32) -> VideoTask {
    VideoTask {
        status: TaskStatus::Pending,
        progress: Some(progress),
        video_url: None,
        cover_url: None,
        fail_reason: None,
    }
}

pub fn finished_video(url: &str) -> VideoTask {
    VideoTask {
        status: TaskStatus::Success,
        progress: Some(100.0),
        video_url: Some(url.to_string()),
        ..video_progress(100.0)
    }
}

#[async_trait]
impl ImageGenerator for MockGateway {
    async fn submit(
        &self,
        _channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &ImageOptions,
    ) -> Result<String, AdapterError> {
        let mut inner = self.record(MockCall::ImageSubmit {
            prompt: prompt.to_string(),
            model: model.to_string(),
            options: options.clone(),
        });
        match inner.image_submits.pop_front() {
            Some(result) => result,
            None => Ok(Self::task_id(&mut inner, "image")),
        }
    }

    async fn poll(&self, _channel: &ChannelCredentials, task_id: &str) -> Result<ImageTask, AdapterError> {
        let mut inner = self.record(MockCall::ImagePoll {
            task_id: task_id.to_string(),
        });
        match inner.image_polls.pop_front() {
            Some(result) => result,
            None if inner.stalled => Ok(pending_image()),
            None => Ok(finished_image(&format!("https://mock.test/images/{task_id}.png"))),
        }
    }

    async fn generate_immediate(
        &self,
        _channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        references: &[String],
        options: &ImageOptions,
    ) -> Result<Vec<String>, AdapterError> {
        let mut inner = self.record(MockCall::ImageImmediate {
            prompt: prompt.to_string(),
            model: model.to_string(),
            references: references.to_vec(),
            options: options.clone(),
        });
        inner
            .immediate
            .pop_front()
            .unwrap_or_else(|| Ok(vec!["https://mock.test/images/immediate.png".to_string()]))
    }
}

#[async_trait]
impl VideoGenerator for MockGateway {
    async fn submit(
        &self,
        _channel: &ChannelCredentials,
        prompt: &str,
        model: &str,
        options: &VideoOptions,
    ) -> Result<String, AdapterError> {
        let mut inner = self.record(MockCall::VideoSubmit {
            prompt: prompt.to_string(),
            model: model.to_string(),
            options: options.clone(),
        });
        match inner.video_submits.pop_front() {
            Some(result) => result,
            None => Ok(Self::task_id(&mut inner, "video")),
        }
    }

    async fn poll(&self, _channel: &ChannelCredentials, task_id: &str) -> Result<VideoTask, AdapterError> {
        let mut inner = self.record(MockCall::VideoPoll {
            task_id: task_id.to_string(),
        });
        match inner.video_polls.pop_front() {
            Some(result) => result,
            None if inner.stalled => Ok(video_progress(0.0)),
            None => Ok(finished_video(&format!("https://mock.test/videos/{task_id}.mp4"))),
        }
    }
}

#[async_trait]
impl TextEngine for MockGateway {
    async fn chat(
        &self,
        _settings: &TextEngineSettings,
        system_prompt: &str,
        user_prompt: &str,
        format: &ResponseFormat,
    ) -> Result<String, AdapterError> {
        let mut inner = self.record(MockCall::Chat {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
            format: format.clone(),
        });
        inner
            .chats
            .pop_front()
            .unwrap_or_else(|| Ok(format!("Detailed look: {user_prompt}")))
    }
}
