//! Workflow documents: the persisted `{nodes, edges}` in canvas wire format

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistError;
use crate::graph::GraphStore;
use crate::nodes::{Edge, EdgeId, Node, NodeData, NodeId, NodeKind, NodeStatus, NodeType, Position};

pub const STORE_NAME: &str = "sora-canvas-storage";
pub const STORE_VERSION: u32 = 1;

/// Canvas node as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub position: Position,
    #[serde(default)]
    pub data: WireNodeData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireNodeData {
    pub label: String,
    pub content: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "sourceHandle", default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(rename = "targetHandle", default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub nodes: Vec<WireNode>,
    #[serde(default)]
    pub edges: Vec<WireEdge>,
}

/// The whole stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedWorkflow {
    pub name: String,
    pub version: u32,
    pub state: WorkflowState,
}

impl WireNode {
    pub fn from_node(node: &Node) -> Self {
        let mut data = WireNodeData {
            label: node.data.label.clone(),
            content: node.data.content.clone(),
            status: node.data.status,
            error_message: node.data.error_message.clone(),
            progress: node.data.progress,
            api_id: node.data.api_id.clone(),
            ..WireNodeData::default()
        };
        match &node.kind {
            NodeKind::Script { style_context } => data.style_context = style_context.clone(),
            NodeKind::Text => {}
            NodeKind::Character {
                identity_prompt,
                image_url,
                config,
            } => {
                data.identity_prompt = identity_prompt.clone();
                data.image_url = image_url.clone();
                data.config = config_value(config);
            }
            NodeKind::Image { image_url, config } => {
                data.image_url = image_url.clone();
                data.config = config_value(config);
            }
            NodeKind::Video {
                video_url,
                cover_url,
                config,
            } => {
                data.video_url = video_url.clone();
                data.cover_url = cover_url.clone();
                data.config = config_value(config);
            }
        }
        Self {
            id: node.id.to_string(),
            node_type: node.node_type(),
            position: node.position,
            data,
        }
    }

    /// Runs cannot survive a reload, so queued/busy nodes come back idle
    pub fn into_node(self) -> Node {
        let data = self.data;
        let mut kind = NodeKind::for_type(self.node_type);
        match &mut kind {
            NodeKind::Script { style_context } => *style_context = data.style_context,
            NodeKind::Text => {}
            NodeKind::Character {
                identity_prompt,
                image_url,
                config,
            } => {
                *identity_prompt = data.identity_prompt;
                *image_url = data.image_url;
                if let Some(value) = data.config {
                    *config = parse_config(&self.id, value, config);
                }
            }
            NodeKind::Image { image_url, config } => {
                *image_url = data.image_url;
                if let Some(value) = data.config {
                    *config = parse_config(&self.id, value, config);
                }
            }
            NodeKind::Video {
                video_url,
                cover_url,
                config,
            } => {
                *video_url = data.video_url;
                *cover_url = data.cover_url;
                if let Some(value) = data.config {
                    *config = parse_config(&self.id, value, config);
                }
            }
        }

        let interrupted = data.status.is_running();
        if interrupted {
            log::info!("Node {} was mid-run when saved; resetting to idle", self.id);
        }
        Node {
            id: NodeId::new(self.id),
            position: self.position,
            data: NodeData {
                label: data.label,
                content: data.content,
                status: if interrupted { NodeStatus::Idle } else { data.status },
                error_message: data.error_message,
                progress: data.progress,
                api_id: if interrupted { None } else { data.api_id },
            },
            kind,
        }
    }
}

fn config_value<T: Serialize>(config: &T) -> Option<Value> {
    serde_json::to_value(config)
        .map_err(|e| log::warn!("Failed to encode node config: {}", e))
        .ok()
}

/// A config that does not parse keeps the type's defaults
fn parse_config<T: for<'de> Deserialize<'de> + Clone>(id: &str, value: Value, fallback: &T) -> T {
    serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed config on node {}: {}", id, e);
        fallback.clone()
    })
}

impl From<&Edge> for WireEdge {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id.as_str().to_string(),
            source: edge.source.to_string(),
            target: edge.target.to_string(),
            source_handle: None,
            target_handle: None,
        }
    }
}

impl From<WireEdge> for Edge {
    fn from(edge: WireEdge) -> Self {
        Self {
            id: EdgeId::new(edge.id),
            source: NodeId::new(edge.source),
            target: NodeId::new(edge.target),
        }
    }
}

impl PersistedWorkflow {
    pub fn from_store(store: &GraphStore) -> Self {
        Self {
            name: STORE_NAME.to_string(),
            version: STORE_VERSION,
            state: WorkflowState {
                nodes: store.nodes().map(WireNode::from_node).collect(),
                edges: store.edges().iter().map(WireEdge::from).collect(),
            },
        }
    }

    /// Check name and version, then convert to domain nodes and edges
    pub fn into_parts(self) -> Result<(Vec<Node>, Vec<Edge>), PersistError> {
        if self.name != STORE_NAME {
            return Err(PersistError::WrongStore(self.name));
        }
        if self.version > STORE_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                supported: STORE_VERSION,
            });
        }
        let nodes = self.state.nodes.into_iter().map(WireNode::into_node).collect();
        let edges = self.state.edges.into_iter().map(Edge::from).collect();
        Ok((nodes, edges))
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }
}

pub fn save(store: &GraphStore, path: &Path) -> Result<(), PersistError> {
    let json = PersistedWorkflow::from_store(store).to_json()?;
    std::fs::write(path, json)?;
    log::info!("Saved {} nodes to {}", store.node_count(), path.display());
    Ok(())
}

/// Load into a fresh store (no history); duplicate nodes and dangling edges are dropped
pub fn load(path: &Path, history_limit: usize) -> Result<GraphStore, PersistError> {
    let json = std::fs::read_to_string(path)?;
    let (nodes, edges) = PersistedWorkflow::from_json(&json)?.into_parts()?;
    let store = GraphStore::from_parts(nodes, edges, history_limit);
    log::info!("Loaded {} nodes from {}", store.node_count(), path.display());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{
        Connection, ImageConfig, ImageModel, NodePatch, Orientation, VideoConfig, VideoDuration,
    };

    fn sample_store() -> GraphStore {
        let mut store = GraphStore::new();
        store.add_node(
            Node::new(NodeType::Character, Position::new(0.0, 0.0))
                .with_id("character-1")
                .with_content("Knight")
                .with_identity_prompt("A knight in silver armor")
                .with_seed(7),
        );
        store.add_node(Node::new(NodeType::Image, Position::new(320.0, 0.0)).with_id("image-1"));
        store.add_node(Node::new(NodeType::Video, Position::new(640.0, 0.0)).with_id("video-1"));
        store.connect(Connection::new("character-1", "image-1"));
        store.update_node_data(
            &NodeId::from("video-1"),
            NodePatch::new()
                .status(NodeStatus::Busy)
                .api_id(Some("task-9".into()))
                .video_config(VideoConfig {
                    orientation: Orientation::Portrait,
                    duration: VideoDuration::Fifteen,
                    is_hd: true,
                    ..VideoConfig::default()
                }),
        );
        store
    }

    #[test]
    fn document_shape() {
        let doc = PersistedWorkflow::from_store(&sample_store());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["name"], "sora-canvas-storage");
        assert_eq!(value["version"], 1);
        let image = &value["state"]["nodes"][1];
        assert_eq!(image["type"], "image");
        assert_eq!(image["data"]["config"]["seed"], 7);
        assert_eq!(image["data"]["config"]["characterRef"], "Knight");
        assert_eq!(value["state"]["nodes"][2]["data"]["config"]["isHD"], true);
        assert_eq!(value["state"]["edges"][0]["source"], "character-1");
    }

    #[test]
    fn round_trip_resets_interrupted_runs() {
        let store = sample_store();
        let json = PersistedWorkflow::from_store(&store).to_json().unwrap();
        let (nodes, edges) = PersistedWorkflow::from_json(&json).unwrap().into_parts().unwrap();

        assert_eq!(edges, store.edges());
        assert_eq!(nodes[0], *store.node(&NodeId::from("character-1")).unwrap());
        let video = &nodes[2];
        assert_eq!(video.data.status, NodeStatus::Idle);
        assert_eq!(video.data.api_id, None);
        assert!(video.video_config().unwrap().is_hd);
    }

    #[test]
    fn foreign_documents_are_rejected() {
        let wrong = r#"{"name": "other", "version": 1, "state": {"nodes": [], "edges": []}}"#;
        assert!(matches!(
            PersistedWorkflow::from_json(wrong).unwrap().into_parts(),
            Err(PersistError::WrongStore(_))
        ));
        let future = r#"{"name": "sora-canvas-storage", "version": 3, "state": {}}"#;
        assert!(matches!(
            PersistedWorkflow::from_json(future).unwrap().into_parts(),
            Err(PersistError::UnsupportedVersion { found: 3, .. })
        ));
    }

    #[test]
    fn sparse_wire_nodes_get_defaults() {
        let json = r#"{"name": "sora-canvas-storage", "version": 1, "state": {"nodes": [
            {"id": "image-1", "type": "image", "position": {"x": 1, "y": 2},
             "data": {"content": "a lighthouse", "config": {"imageModel": "pro"}}},
            {"id": "image-2", "type": "image", "position": {"x": 0, "y": 0},
             "data": {"config": {"seed": "not a number"}}}
        ], "edges": [{"id": "e1", "source": "image-1", "target": "ghost"}]}}"#;
        let (nodes, edges) = PersistedWorkflow::from_json(json).unwrap().into_parts().unwrap();
        let config = nodes[0].image_config().unwrap();
        assert_eq!(config.image_model, ImageModel::Pro);
        assert_eq!(config.aspect_ratio, "16:9");
        assert_eq!(nodes[1].image_config(), Some(&ImageConfig::default()));

        let store = GraphStore::from_parts(nodes, edges, 30);
        assert!(store.edges().is_empty());
    }
}
