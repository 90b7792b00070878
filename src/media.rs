//! Generated media cache, keyed by node id

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;

use crate::nodes::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Decoded payload of a `data:` URL
#[derive(Debug, Clone, PartialEq)]
pub struct InlineMedia {
    pub mime: String,
    pub bytes: Arc<Vec<u8>>,
    /// Width and height, if the bytes decode as an image
    pub dimensions: Option<(u32, u32)>,
}

/// A cached result owned by one node
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub kind: MediaKind,
    /// Remote URL or `data:` URL as returned by the backend
    pub url: String,
    pub inline: Option<InlineMedia>,
}

pub trait MediaCache: Send + Sync {
    /// Replace whatever was stored for `node_id`
    fn save(&self, node_id: &NodeId, kind: MediaKind, data: &str);
    fn get(&self, node_id: &NodeId) -> Option<MediaAsset>;
    fn remove(&self, node_id: &NodeId);
}

#[derive(Debug, Default)]
pub struct InMemoryMediaCache {
    assets: Mutex<HashMap<NodeId, MediaAsset>>,
}

impl InMemoryMediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MediaCache for InMemoryMediaCache {
    fn save(&self, node_id: &NodeId, kind: MediaKind, data: &str) {
        let inline = decode_data_url(data).map(|(mime, bytes)| {
            let dimensions = if kind == MediaKind::Image {
                probe_dimensions(&bytes)
            } else {
                None
            };
            InlineMedia {
                mime,
                bytes: Arc::new(bytes),
                dimensions,
            }
        });
        let asset = MediaAsset {
            kind,
            url: data.to_string(),
            inline,
        };
        let mut assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        assets.remove(node_id);
        assets.insert(node_id.clone(), asset);
        log::debug!("Cached {:?} for node {}", kind, node_id);
    }

    fn get(&self, node_id: &NodeId) -> Option<MediaAsset> {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
    }

    fn remove(&self, node_id: &NodeId) {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
    }
}

/// Split a base64 `data:<mime>;base64,<payload>` URL into mime and bytes
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| log::warn!("Failed to decode inline media: {}", e))
        .ok()?;
    Some((mime.to_string(), bytes))
}

/// Decode just far enough to learn the image size
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some((img.width(), img.height())),
        Err(e) => {
            log::warn!("Failed to decode image: {}", e);
            None
        }
    }
}
