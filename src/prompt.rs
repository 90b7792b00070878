//! Effective prompt composition from upstream nodes

use std::sync::Arc;

use crate::graph::GraphStore;
use crate::nodes::{Node, NodeId, NodeKind};

/// Build the prompt sent for a generation node.
///
/// Character parents with an identity prompt prepend `Context: (<identity>), `,
/// text parents with content append `, <content>`, both in the given order.
/// The node's own content is always the base.
pub fn compose_prompt(own_content: &str, upstream: &[Arc<Node>]) -> String {
    let mut prefix = String::new();
    let mut suffix = String::new();

    for parent in upstream {
        match &parent.kind {
            NodeKind::Character {
                identity_prompt: Some(identity),
                ..
            } if !identity.is_empty() => {
                prefix.push_str("Context: (");
                prefix.push_str(identity);
                prefix.push_str("), ");
            }
            NodeKind::Text if !parent.data.content.is_empty() => {
                suffix.push_str(", ");
                suffix.push_str(&parent.data.content);
            }
            _ => {}
        }
    }

    format!("{prefix}{own_content}{suffix}")
}

/// Effective prompt for `id` as currently wired, `None` if the node is missing
pub fn effective_prompt(store: &GraphStore, id: &NodeId) -> Option<String> {
    let node = store.node(id)?;
    Some(compose_prompt(&node.data.content, &store.upstream(id)))
}

/// Portrait URLs of upstream characters, used as reference images
pub fn reference_images(upstream: &[Arc<Node>]) -> Vec<String> {
    upstream
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Character { .. }))
        .filter_map(|n| n.image_url())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
