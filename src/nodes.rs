//! Node types and their definitions

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All node kinds available on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Free-text screenplay, expanded into a subgraph by the LLM
    Script,
    /// Passive style / directive text
    Text,
    Character,
    Image,
    Video,
}

impl NodeType {
    /// Get the display name for this node type
    pub fn name(&self) -> &'static str {
        match self {
            Self::Script => "Script",
            Self::Text => "Text",
            Self::Character => "Character",
            Self::Image => "Image",
            Self::Video => "Video",
        }
    }

    /// Wire / id prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Text => "text",
            Self::Character => "character",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Image and video nodes call a generation backend
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<type>-<uuid>`, unique per session
    pub fn generate(node_type: NodeType) -> Self {
        Self(format!("{}-{}", node_type.as_str(), Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Execution status of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Queued,
    Busy,
    Done,
    Error,
}

impl NodeStatus {
    /// Queued or busy: a run is in flight
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Queued | Self::Busy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Busy => "busy",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas-space position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Which image backend a node renders with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageModel {
    /// Task-based generation API, polled until done
    #[default]
    Standard,
    /// Chat-completion multimodal model, answers immediately
    Pro,
}

/// Generation settings shared by image and character nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    pub aspect_ratio: String,
    pub resolution: String,
    pub seed: Option<u64>,
    pub image_model: ImageModel,
    pub style_prompt: Option<String>,
    pub character_ref: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            resolution: "1K".to_string(),
            seed: None,
            image_model: ImageModel::Standard,
            style_prompt: None,
            character_ref: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoDuration {
    #[default]
    #[serde(rename = "10s")]
    Ten,
    #[serde(rename = "15s")]
    Fifteen,
    #[serde(rename = "25s")]
    TwentyFive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConfig {
    pub orientation: Orientation,
    pub duration: VideoDuration,
    #[serde(rename = "isHD")]
    pub is_hd: bool,
    pub seed: Option<u64>,
    pub character_ref: Option<String>,
}

/// Fields every node carries regardless of kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
    pub label: String,
    /// Authoritative editable prompt fragment
    pub content: String,
    pub status: NodeStatus,
    pub error_message: Option<String>,
    /// 0-100
    pub progress: Option<f32>,
    /// Remote task handle while polling
    pub api_id: Option<String>,
}

/// Properties specific to each node type
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Script {
        style_context: Option<String>,
    },
    Text,
    Character {
        /// AI-expanded description used by downstream nodes
        identity_prompt: Option<String>,
        image_url: Option<String>,
        config: ImageConfig,
    },
    Image {
        image_url: Option<String>,
        config: ImageConfig,
    },
    Video {
        video_url: Option<String>,
        cover_url: Option<String>,
        config: VideoConfig,
    },
}

impl NodeKind {
    pub fn for_type(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Script => Self::Script { style_context: None },
            NodeType::Text => Self::Text,
            NodeType::Character => Self::Character {
                identity_prompt: None,
                image_url: None,
                config: ImageConfig {
                    aspect_ratio: "3:4".to_string(),
                    ..ImageConfig::default()
                },
            },
            NodeType::Image => Self::Image {
                image_url: None,
                config: ImageConfig::default(),
            },
            NodeType::Video => Self::Video {
                video_url: None,
                cover_url: None,
                config: VideoConfig::default(),
            },
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Script { .. } => NodeType::Script,
            Self::Text => NodeType::Text,
            Self::Character { .. } => NodeType::Character,
            Self::Image { .. } => NodeType::Image,
            Self::Video { .. } => NodeType::Video,
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(node_type: NodeType, position: Position) -> Self {
        Self {
            id: NodeId::generate(node_type),
            position,
            data: NodeData {
                label: node_type.name().to_string(),
                ..NodeData::default()
            },
            kind: NodeKind::for_type(node_type),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = label.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.data.content = content.into();
        self
    }

    /// Only meaningful on character nodes; ignored elsewhere.
    pub fn with_identity_prompt(mut self, prompt: impl Into<String>) -> Self {
        if let NodeKind::Character { identity_prompt, .. } = &mut self.kind {
            *identity_prompt = Some(prompt.into());
        }
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        match &mut self.kind {
            NodeKind::Character { config, .. } | NodeKind::Image { config, .. } => {
                config.seed = Some(seed)
            }
            NodeKind::Video { config, .. } => config.seed = Some(seed),
            NodeKind::Script { .. } | NodeKind::Text => {}
        }
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn identity_prompt(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Character { identity_prompt, .. } => identity_prompt.as_deref(),
            _ => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Character { image_url, .. } | NodeKind::Image { image_url, .. } => {
                image_url.as_deref()
            }
            _ => None,
        }
    }

    pub fn video_url(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Video { video_url, .. } => video_url.as_deref(),
            _ => None,
        }
    }

    pub fn image_config(&self) -> Option<&ImageConfig> {
        match &self.kind {
            NodeKind::Character { config, .. } | NodeKind::Image { config, .. } => Some(config),
            _ => None,
        }
    }

    pub fn video_config(&self) -> Option<&VideoConfig> {
        match &self.kind {
            NodeKind::Video { config, .. } => Some(config),
            _ => None,
        }
    }
}

/// A partial update merged into a node's data.
///
/// `None` leaves a field untouched. Fields that do not exist on the target
/// node's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub label: Option<String>,
    pub content: Option<String>,
    pub status: Option<NodeStatus>,
    pub error_message: Option<Option<String>>,
    pub progress: Option<Option<f32>>,
    pub api_id: Option<Option<String>>,
    pub identity_prompt: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub style_context: Option<String>,
    pub image_config: Option<ImageConfig>,
    pub video_config: Option<VideoConfig>,
}

impl NodePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Status `error` plus the message shown in the node
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = Some(NodeStatus::Error);
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    /// Clamped to 0-100
    pub fn progress(mut self, progress: f32) -> Self {
        self.progress = Some(Some(progress.clamp(0.0, 100.0)));
        self
    }

    pub fn api_id(mut self, api_id: Option<String>) -> Self {
        self.api_id = Some(api_id);
        self
    }

    pub fn identity_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.identity_prompt = Some(prompt.into());
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn video_url(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }

    pub fn cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    pub fn style_context(mut self, style: impl Into<String>) -> Self {
        self.style_context = Some(style.into());
        self
    }

    pub fn image_config(mut self, config: ImageConfig) -> Self {
        self.image_config = Some(config);
        self
    }

    pub fn video_config(mut self, config: VideoConfig) -> Self {
        self.video_config = Some(config);
        self
    }

    pub fn apply(self, node: &mut Node) {
        let data = &mut node.data;
        if let Some(label) = self.label {
            data.label = label;
        }
        if let Some(content) = self.content {
            data.content = content;
        }
        if let Some(status) = self.status {
            data.status = status;
        }
        if let Some(message) = self.error_message {
            data.error_message = message;
        }
        if let Some(progress) = self.progress {
            data.progress = progress;
        }
        if let Some(api_id) = self.api_id {
            data.api_id = api_id;
        }

        match &mut node.kind {
            NodeKind::Script { style_context } => {
                if let Some(style) = self.style_context {
                    *style_context = Some(style);
                }
            }
            NodeKind::Text => {}
            NodeKind::Character {
                identity_prompt,
                image_url,
                config,
            } => {
                if let Some(prompt) = self.identity_prompt {
                    *identity_prompt = Some(prompt);
                }
                if let Some(url) = self.image_url {
                    *image_url = Some(url);
                }
                if let Some(new_config) = self.image_config {
                    *config = new_config;
                }
            }
            NodeKind::Image { image_url, config } => {
                if let Some(url) = self.image_url {
                    *image_url = Some(url);
                }
                if let Some(new_config) = self.image_config {
                    *config = new_config;
                }
            }
            NodeKind::Video {
                video_url,
                cover_url,
                config,
            } => {
                if let Some(url) = self.video_url {
                    *video_url = Some(url);
                }
                if let Some(url) = self.cover_url {
                    *cover_url = Some(url);
                }
                if let Some(new_config) = self.video_config {
                    *config = new_config;
                }
            }
        }
    }
}

/// Edge identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directed edge: source feeds target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId(format!("e-{}", Uuid::new_v4().simple())),
            source,
            target,
        }
    }
}

/// A requested connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}
