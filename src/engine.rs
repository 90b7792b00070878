//! Node execution engine
//!
//! [`Studio`] owns the graph store and runs generation nodes as tokio tasks.
//! Each run is registered under its node id with a ticket; deleting the node
//! (or shutting down) aborts the task, and writes from a superseded ticket are
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};

use crate::adapters::{
    normalize_progress, ChannelCredentials, ImageGenerator, ImageOptions, ImageTask, ResponseFormat,
    TaskStatus, TextEngine, TextEngineSettings, VideoGenerator, VideoOptions, VideoTask,
};
use crate::config::{ModelConfig, StudioConfig};
use crate::error::NodeError;
use crate::graph::GraphStore;
use crate::media::{MediaCache, MediaKind};
use crate::models::map_to_sora_id;
use crate::nodes::{Edge, ImageConfig, ImageModel, Node, NodeId, NodeKind, NodePatch, NodeStatus, NodeType};
use crate::poll::{poll_task, PollPolicy, PollStep};
use crate::prompt::{compose_prompt, reference_images};
use crate::script;

pub const CHARACTER_BRIEF_PROMPT: &str = "You are a character designer for a film pre-visualisation tool. \
Expand the short character note you are given into one dense paragraph describing the character's \
appearance: face, build, age, hair, wardrobe, colours and distinguishing marks. Describe only what a \
camera would see. Answer with the paragraph only.";

/// The remote collaborators a [`Studio`] calls
#[derive(Clone)]
pub struct Adapters {
    pub images: Arc<dyn ImageGenerator>,
    pub videos: Arc<dyn VideoGenerator>,
    pub text: Arc<dyn TextEngine>,
    pub media: Arc<dyn MediaCache>,
}

impl Adapters {
    /// One gateway serving image, video and text
    pub fn from_gateway<G>(gateway: Arc<G>, media: Arc<dyn MediaCache>) -> Self
    where
        G: ImageGenerator + VideoGenerator + TextEngine + 'static,
    {
        Self {
            images: gateway.clone(),
            videos: gateway.clone(),
            text: gateway,
            media,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub models: ModelConfig,
    pub image_polling: PollPolicy,
    pub video_polling: PollPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&StudioConfig::default())
    }
}

impl From<&StudioConfig> for EngineSettings {
    fn from(config: &StudioConfig) -> Self {
        Self {
            models: config.models.clone(),
            image_polling: config.polling.image_policy(),
            video_polling: config.polling.video_policy(),
        }
    }
}

struct RunningTask {
    ticket: u64,
    abort: AbortHandle,
}

struct Inner {
    store: Mutex<GraphStore>,
    adapters: Adapters,
    settings: EngineSettings,
    tasks: Mutex<HashMap<NodeId, RunningTask>>,
    next_ticket: AtomicU64,
}

/// Graph store plus node execution, constructed once per session
#[derive(Clone)]
pub struct Studio {
    inner: Arc<Inner>,
}

impl Studio {
    pub fn new(store: GraphStore, adapters: Adapters, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                adapters,
                settings,
                tasks: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, GraphStore> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<NodeId, RunningTask>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read access to the graph. Do not await inside `f`.
    pub fn with_store<R>(&self, f: impl FnOnce(&GraphStore) -> R) -> R {
        f(&self.lock_store())
    }

    /// Direct mutation of the graph. Do not await inside `f`.
    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut GraphStore) -> R) -> R {
        f(&mut self.lock_store())
    }

    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.with_store(|store| store.node(id).cloned())
    }

    pub fn media(&self) -> &Arc<dyn MediaCache> {
        &self.inner.adapters.media
    }

    pub fn is_running(&self, id: &NodeId) -> bool {
        self.lock_tasks().contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Run a node and wait for it to reach a terminal state.
    ///
    /// No-op for missing nodes, text nodes and nodes already queued or busy.
    pub async fn process_node(
        &self,
        id: &NodeId,
        channel: &ChannelCredentials,
        text: &TextEngineSettings,
    ) {
        let Some(handle) = self.spawn_node(id, channel, text) else {
            return;
        };
        match handle.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => log::info!("Run of {} cancelled", id),
            Err(err) => log::error!("Run of {} panicked: {}", id, err),
        }
    }

    /// Start a node run in the background; `None` if the guards refuse it.
    pub fn spawn_node(
        &self,
        id: &NodeId,
        channel: &ChannelCredentials,
        text: &TextEngineSettings,
    ) -> Option<JoinHandle<()>> {
        let node_type = self.with_store_mut(|store| {
            let node = store.node(id)?;
            let node_type = node.node_type();
            if node_type == NodeType::Text || node.data.status.is_running() {
                return None;
            }
            store.update_node_data(
                id,
                NodePatch::new().status(NodeStatus::Queued).clear_error(),
            );
            Some(node_type)
        });
        let Some(node_type) = node_type else {
            log::debug!("Not running {}: missing, passive or already running", id);
            return None;
        };

        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let run = Run {
            studio: self.clone(),
            id: id.clone(),
            ticket,
            channel: channel.clone(),
            text: text.clone(),
        };

        // Held across spawn so the task cannot finish before it is registered
        let mut tasks = self.lock_tasks();
        let handle = tokio::spawn(run.execute(node_type));
        let previous = tasks.insert(
            id.clone(),
            RunningTask {
                ticket,
                abort: handle.abort_handle(),
            },
        );
        drop(tasks);
        if let Some(previous) = previous {
            previous.abort.abort();
        }
        log::info!("Queued {} node {}", node_type, id);
        Some(handle)
    }

    /// Abort the node's run, if any. The node returns to idle.
    pub fn cancel(&self, id: &NodeId) -> bool {
        let Some(task) = self.lock_tasks().remove(id) else {
            return false;
        };
        task.abort.abort();
        self.with_store_mut(|store| {
            store.update_node_data(
                id,
                NodePatch::new().status(NodeStatus::Idle).api_id(None),
            )
        });
        log::info!("Cancelled run of {}", id);
        true
    }

    /// Delete a node: cancels its run and purges its cached media
    pub fn delete_node(&self, id: &NodeId) -> bool {
        if let Some(task) = self.lock_tasks().remove(id) {
            task.abort.abort();
        }
        let deleted = self.with_store_mut(|store| store.delete_node(id));
        if deleted {
            self.inner.adapters.media.remove(id);
        }
        deleted
    }

    pub fn clear_canvas(&self) {
        self.with_store_mut(GraphStore::clear_canvas);
        self.reconcile();
    }

    pub fn set_workflow(&self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.with_store_mut(|store| store.set_workflow(nodes, edges));
        self.reconcile();
    }

    pub fn undo(&self) -> bool {
        let changed = self.with_store_mut(GraphStore::undo);
        self.reconcile();
        changed
    }

    pub fn redo(&self) -> bool {
        let changed = self.with_store_mut(GraphStore::redo);
        self.reconcile();
        changed
    }

    /// Abort runs whose node is gone and unstick restored nodes that claim
    /// to be running without a task.
    fn reconcile(&self) {
        let mut tasks = self.lock_tasks();
        let mut store = self.lock_store();
        tasks.retain(|id, task| {
            let alive = store.contains(id);
            if !alive {
                log::info!("Aborting run of removed node {}", id);
                task.abort.abort();
            }
            alive
        });
        let stuck: Vec<NodeId> = store
            .nodes()
            .filter(|n| n.data.status.is_running() && !tasks.contains_key(&n.id))
            .map(|n| n.id.clone())
            .collect();
        for id in stuck {
            store.update_node_data(&id, NodePatch::new().status(NodeStatus::Idle).api_id(None));
        }
    }

    /// Abort every outstanding run
    pub fn shutdown(&self) {
        let tasks: Vec<RunningTask> = self.lock_tasks().drain().map(|(_, task)| task).collect();
        for task in &tasks {
            task.abort.abort();
        }
        if !tasks.is_empty() {
            log::info!("Aborted {} running node(s)", tasks.len());
        }
    }

    /// Runs `write` only while `ticket` is the node's live run.
    ///
    /// The tasks lock stays held for the whole write, so `cancel` and
    /// `delete_node` either happen before the check or after the write.
    fn if_current<R>(&self, id: &NodeId, ticket: u64, write: impl FnOnce() -> R) -> Option<R> {
        let tasks = self.lock_tasks();
        if !tasks.get(id).is_some_and(|task| task.ticket == ticket) {
            return None;
        }
        let result = write();
        drop(tasks);
        Some(result)
    }

    fn finish(&self, id: &NodeId, ticket: u64) {
        let mut tasks = self.lock_tasks();
        if tasks.get(id).is_some_and(|task| task.ticket == ticket) {
            tasks.remove(id);
        }
    }
}

/// One execution of one node
struct Run {
    studio: Studio,
    id: NodeId,
    ticket: u64,
    channel: ChannelCredentials,
    text: TextEngineSettings,
}

impl Run {
    fn adapters(&self) -> &Adapters {
        &self.studio.inner.adapters
    }

    fn settings(&self) -> &EngineSettings {
        &self.studio.inner.settings
    }

    /// Ticketed update: dropped if this run was superseded or cancelled
    fn update(&self, patch: NodePatch) -> bool {
        let written = self.studio.if_current(&self.id, self.ticket, || {
            self.studio
                .with_store_mut(|store| store.update_node_data(&self.id, patch))
        });
        written.unwrap_or_else(|| {
            log::debug!("Dropping stale update for {}", self.id);
            false
        })
    }

    /// The node and its upstream nodes, as wired right now
    fn inputs(&self) -> Result<(Node, Vec<Arc<Node>>), NodeError> {
        self.studio.with_store(|store| {
            let node = store
                .node(&self.id)
                .cloned()
                .ok_or(NodeError::EmptyResult("node no longer exists"))?;
            Ok((node, store.upstream(&self.id)))
        })
    }

    fn cache(&self, kind: MediaKind, url: &str) {
        let media = &self.adapters().media;
        if self
            .studio
            .if_current(&self.id, self.ticket, || media.save(&self.id, kind, url))
            .is_none()
        {
            log::debug!("Not caching media for superseded run of {}", self.id);
        }
    }

    async fn execute(self, node_type: NodeType) {
        self.update(NodePatch::new().status(NodeStatus::Busy));

        let outcome = match node_type {
            NodeType::Script => self.run_script().await,
            NodeType::Character => self.run_character().await,
            NodeType::Image => self.run_image().await,
            NodeType::Video => self.run_video().await,
            // refused by `spawn_node`
            NodeType::Text => Ok(NodePatch::new().status(NodeStatus::Idle)),
        };

        match outcome {
            Ok(patch) => {
                log::info!("Node {} finished", self.id);
                self.update(NodePatch {
                    status: patch.status.or(Some(NodeStatus::Done)),
                    error_message: Some(None),
                    api_id: Some(None),
                    ..patch
                });
            }
            Err(err) => {
                log::error!("Node {} failed: {}", self.id, err);
                self.update(NodePatch::new().failed(err.to_string()));
            }
        }
        self.studio.finish(&self.id, self.ticket);
    }

    async fn run_script(&self) -> Result<NodePatch, NodeError> {
        let (node, _) = self.inputs()?;
        let style = match &node.kind {
            NodeKind::Script { style_context } => style_context.clone().unwrap_or_default(),
            _ => String::new(),
        };

        // One snapshot for the whole expansion
        self.studio.with_store_mut(GraphStore::take_snapshot);

        let analysis =
            script::analyze(self.adapters().text.as_ref(), &self.text, &node.data.content).await?;
        let (nodes, edges) = script::build_subgraph(&node, &style, &analysis);
        let (node_count, edge_count) = (nodes.len(), edges.len());
        let inserted = self.studio.if_current(&self.id, self.ticket, || {
            self.studio
                .with_store_mut(|store| store.insert_batch(nodes, edges))
        });
        if inserted.is_some() {
            log::info!(
                "Script {} expanded into {} nodes, {} edges",
                self.id,
                node_count,
                edge_count
            );
        }
        Ok(NodePatch::new())
    }

    async fn run_character(&self) -> Result<NodePatch, NodeError> {
        let (node, _) = self.inputs()?;
        let brief = self
            .adapters()
            .text
            .chat(
                &self.text,
                CHARACTER_BRIEF_PROMPT,
                &node.data.content,
                &ResponseFormat::Text,
            )
            .await?;
        let brief = brief.trim().to_string();
        if brief.is_empty() {
            return Err(NodeError::EmptyResult("character brief came back empty"));
        }
        self.update(NodePatch::new().identity_prompt(brief.clone()));

        let config = node.image_config().cloned().unwrap_or_default();
        let url = self.generate_image(&brief, &[], &config).await?;
        self.cache(MediaKind::Image, &url);
        Ok(NodePatch::new().image_url(url))
    }

    async fn run_image(&self) -> Result<NodePatch, NodeError> {
        let (node, upstream) = self.inputs()?;
        let prompt = compose_prompt(&node.data.content, &upstream);
        let config = node.image_config().cloned().unwrap_or_default();
        let references = match config.image_model {
            ImageModel::Pro => reference_images(&upstream),
            ImageModel::Standard => Vec::new(),
        };
        log::info!("Generating image for {}: {}", self.id, prompt);

        let url = self.generate_image(&prompt, &references, &config).await?;
        self.cache(MediaKind::Image, &url);
        Ok(NodePatch::new().image_url(url))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        references: &[String],
        config: &ImageConfig,
    ) -> Result<String, NodeError> {
        let images = self.adapters().images.as_ref();
        let options = ImageOptions {
            aspect_ratio: config.aspect_ratio.clone(),
            resolution: config.resolution.clone(),
            seed: config.seed,
        };

        match config.image_model {
            ImageModel::Pro => {
                let model = &self.settings().models.pro_image;
                let urls = images
                    .generate_immediate(&self.channel, prompt, model, references, &options)
                    .await?;
                urls.into_iter()
                    .next()
                    .ok_or(NodeError::EmptyResult("image model returned no images"))
            }
            ImageModel::Standard => {
                let model = &self.settings().models.standard_image;
                let task_id = images.submit(&self.channel, prompt, model, &options).await?;
                self.update(NodePatch::new().api_id(Some(task_id.clone())));

                let channel = &self.channel;
                let task = task_id.as_str();
                let url = poll_task(
                    &self.settings().image_polling,
                    move || images.poll(channel, task),
                    image_step,
                )
                .await?;
                Ok(url)
            }
        }
    }

    async fn run_video(&self) -> Result<NodePatch, NodeError> {
        let (node, upstream) = self.inputs()?;
        let prompt = compose_prompt(&node.data.content, &upstream);
        let config = node.video_config().cloned().unwrap_or_default();
        let model = map_to_sora_id(config.orientation, config.duration, config.is_hd);
        let options = VideoOptions {
            seed: config.seed,
            ..VideoOptions::default()
        };
        log::info!("Generating video for {} with {}: {}", self.id, model, prompt);

        let videos = self.adapters().videos.as_ref();
        let task_id = videos.submit(&self.channel, &prompt, model, &options).await?;
        self.update(NodePatch::new().api_id(Some(task_id.clone())).progress(0.0));

        let channel = &self.channel;
        let task = task_id.as_str();
        let (video_url, cover_url) = poll_task(
            &self.settings().video_polling,
            move || videos.poll(channel, task),
            |status: VideoTask| {
                if let Some(progress) = status.progress {
                    self.update(NodePatch::new().progress(normalize_progress(progress)));
                }
                video_step(status)
            },
        )
        .await?;

        self.cache(MediaKind::Video, &video_url);
        let mut patch = NodePatch::new().video_url(video_url).progress(100.0);
        if let Some(cover) = cover_url {
            patch = patch.cover_url(cover);
        }
        Ok(patch)
    }
}

fn image_step(task: ImageTask) -> PollStep<String> {
    match task.status {
        TaskStatus::Success => match task.first_url() {
            Some(url) => PollStep::Done(url.to_string()),
            None => PollStep::Failed("task succeeded without a result url".to_string()),
        },
        TaskStatus::Failed => PollStep::Failed(
            task.fail_reason
                .unwrap_or_else(|| "image generation failed".to_string()),
        ),
        TaskStatus::Pending => PollStep::Pending,
    }
}

/// A video URL ends the loop even if the status still says pending
fn video_step(task: VideoTask) -> PollStep<(String, Option<String>)> {
    if let Some(url) = task.video_url.filter(|url| !url.is_empty()) {
        return PollStep::Done((url, task.cover_url));
    }
    match task.status {
        TaskStatus::Success => PollStep::Failed("video finished without a url".to_string()),
        TaskStatus::Failed => PollStep::Failed(
            task.fail_reason
                .unwrap_or_else(|| "video generation failed".to_string()),
        ),
        TaskStatus::Pending => PollStep::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(status: TaskStatus, url: Option<&str>) -> VideoTask {
        VideoTask {
            status,
            progress: None,
            video_url: url.map(str::to_string),
            cover_url: None,
            fail_reason: None,
        }
    }

    #[test]
    fn video_url_wins_over_pending_status() {
        assert_eq!(
            video_step(video(TaskStatus::Pending, Some("https://cdn.test/v.mp4"))),
            PollStep::Done(("https://cdn.test/v.mp4".to_string(), None))
        );
        assert_eq!(video_step(video(TaskStatus::Pending, Some(""))), PollStep::Pending);
    }

    #[test]
    fn failed_image_task_reports_reason() {
        let step = image_step(ImageTask {
            status: TaskStatus::Failed,
            result_url: None,
            result_urls: Vec::new(),
            fail_reason: Some("nsfw".to_string()),
        });
        assert_eq!(step, PollStep::Failed("nsfw".to_string()));
    }
}
