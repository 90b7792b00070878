//! Node graph state: nodes, edges, selection and history

use std::collections::HashSet;
use std::sync::Arc;

use crate::history::{GraphSnapshot, History, MAX_HISTORY};
use crate::nodes::{Connection, Edge, EdgeId, Node, NodeId, NodeKind, NodePatch, Position};

/// Grid used by [`GraphStore::auto_layout`]
pub mod layout {
    pub const COLUMNS: usize = 4;
    pub const COLUMN_PITCH: f32 = 320.0;
    pub const ROW_PITCH: f32 = 400.0;
    pub const ORIGIN_X: f32 = 100.0;
    pub const ORIGIN_Y: f32 = 100.0;
}

/// Change reported by the canvas for an edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Remove(EdgeId),
    Select { id: EdgeId, selected: bool },
}

/// The canonical workflow graph.
///
/// Every mutator is synchronous and treats unknown ids as a no-op. Structural
/// mutations push a snapshot first; `update_node_data` and `move_node` do not.
#[derive(Debug)]
pub struct GraphStore {
    nodes: Vec<Arc<Node>>,
    edges: Vec<Edge>,
    selected_node: Option<NodeId>,
    selected_edge: Option<EdgeId>,
    hovered_node: Option<NodeId>,
    history: History,
    /// Pre-drag state, pushed on `end_drag` if anything moved
    drag_origin: Option<GraphSnapshot>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_history_limit(MAX_HISTORY)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            selected_node: None,
            selected_edge: None,
            hovered_node: None,
            history: History::new(limit),
            drag_origin: None,
        }
    }

    /// Build a store from persisted parts without recording history
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>, history_limit: usize) -> Self {
        let mut store = Self::with_history_limit(history_limit);
        store.replace(nodes, edges);
        store
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id).map(|n| n.as_ref())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn selected_node(&self) -> Option<&NodeId> {
        self.selected_node.as_ref()
    }

    pub fn selected_edge(&self) -> Option<&EdgeId> {
        self.selected_edge.as_ref()
    }

    pub fn hovered_node(&self) -> Option<&NodeId> {
        self.hovered_node.as_ref()
    }

    pub fn select_node(&mut self, id: Option<NodeId>) {
        self.selected_node = id.filter(|id| self.contains(id));
    }

    pub fn set_hovered(&mut self, id: Option<NodeId>) {
        self.hovered_node = id.filter(|id| self.contains(id));
    }

    /// Distinct source nodes of edges into `id`, in edge order
    pub fn upstream(&self, id: &NodeId) -> Vec<Arc<Node>> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .filter(|e| &e.target == id && seen.insert(&e.source))
            .filter_map(|e| self.nodes.iter().find(|n| n.id == e.source).cloned())
            .collect()
    }

    fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let index = self.position_of(id)?;
        Some(Arc::make_mut(&mut self.nodes[index]))
    }

    pub fn add_node(&mut self, node: Node) {
        if self.contains(&node.id) {
            log::warn!("Ignoring duplicate node id {}", node.id);
            return;
        }
        self.take_snapshot();
        log::info!("Creating {} node {} at {:?}", node.node_type(), node.id, node.position);
        self.nodes.push(Arc::new(node));
    }

    /// Shallow-merge `patch` into the node. Never snapshots.
    pub fn update_node_data(&mut self, id: &NodeId, patch: NodePatch) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                patch.apply(node);
                true
            }
            None => false,
        }
    }

    /// Delete a node and all its connections
    pub fn delete_node(&mut self, id: &NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.take_snapshot();

        // Remove all connections involving this node
        self.edges.retain(|e| &e.source != id && &e.target != id);
        self.nodes.retain(|n| &n.id != id);

        if self.selected_node.as_ref() == Some(id) {
            self.selected_node = None;
        }
        if self.hovered_node.as_ref() == Some(id) {
            self.hovered_node = None;
        }
        self.prune_selected_edge();

        log::info!("Deleted node {}", id);
        true
    }

    /// Append an edge. Self-loops and unknown endpoints are rejected.
    pub fn connect(&mut self, connection: Connection) -> Option<EdgeId> {
        if !self.can_link(&connection.source, &connection.target) {
            log::debug!(
                "Rejected connection {} -> {}",
                connection.source,
                connection.target
            );
            return None;
        }
        self.take_snapshot();
        let edge = Edge::new(connection.source, connection.target);
        let id = edge.id.clone();
        log::info!("Connection created: {} -> {}", edge.source, edge.target);
        self.link(edge);
        Some(id)
    }

    fn can_link(&self, source: &NodeId, target: &NodeId) -> bool {
        source != target && self.contains(source) && self.contains(target)
    }

    /// Push the edge and apply the character propagation rule
    fn link(&mut self, edge: Edge) {
        self.propagate_character(&edge.source, &edge.target);
        self.edges.push(edge);
    }

    /// Character -> image/video copies the seed and sets the character
    /// reference once, at connect time.
    fn propagate_character(&mut self, source: &NodeId, target: &NodeId) {
        let Some(source) = self.node(source) else {
            return;
        };
        let NodeKind::Character { config, .. } = &source.kind else {
            return;
        };
        let seed = config.seed;
        let character_ref = source.data.content.clone();

        let Some(target) = self.node_mut(target) else {
            return;
        };
        match &mut target.kind {
            NodeKind::Image { config, .. } => {
                config.seed = seed;
                config.character_ref = Some(character_ref);
            }
            NodeKind::Video { config, .. } => {
                config.seed = seed;
                config.character_ref = Some(character_ref);
            }
            NodeKind::Script { .. } | NodeKind::Text | NodeKind::Character { .. } => {}
        }
    }

    pub fn disconnect_edge(&mut self, id: &EdgeId) -> bool {
        if !self.edges.iter().any(|e| &e.id == id) {
            return false;
        }
        self.take_snapshot();
        self.edges.retain(|e| &e.id != id);
        self.prune_selected_edge();
        true
    }

    /// Apply a batch of canvas edge changes; snapshots once if any removes.
    pub fn apply_edge_changes(&mut self, changes: Vec<EdgeChange>) {
        let removes_existing = changes.iter().any(|change| {
            matches!(change, EdgeChange::Remove(id) if self.edges.iter().any(|e| &e.id == id))
        });
        if removes_existing {
            self.take_snapshot();
        }
        for change in changes {
            match change {
                EdgeChange::Remove(id) => self.edges.retain(|e| e.id != id),
                EdgeChange::Select { id, selected } => {
                    if selected && self.edges.iter().any(|e| e.id == id) {
                        self.selected_edge = Some(id);
                    } else if !selected && self.selected_edge.as_ref() == Some(&id) {
                        self.selected_edge = None;
                    }
                }
            }
        }
        self.prune_selected_edge();
    }

    fn prune_selected_edge(&mut self) {
        if let Some(id) = &self.selected_edge {
            if !self.edges.iter().any(|e| &e.id == id) {
                self.selected_edge = None;
            }
        }
    }

    /// Live position update while dragging. Never snapshots.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn begin_drag(&mut self) {
        self.drag_origin = Some(self.capture());
    }

    /// Drag-stop: records the pre-drag state if any node moved
    pub fn end_drag(&mut self) {
        let Some(origin) = self.drag_origin.take() else {
            return;
        };
        let moved = origin.nodes.len() != self.nodes.len()
            || origin
                .nodes
                .iter()
                .zip(&self.nodes)
                .any(|(before, now)| before.position != now.position);
        if moved {
            self.history.push(origin);
        }
    }

    pub fn clear_canvas(&mut self) {
        self.take_snapshot();
        self.nodes.clear();
        self.edges.clear();
        self.clear_transient();
    }

    /// Tidy every node into a fixed grid, in array order
    pub fn auto_layout(&mut self) {
        self.take_snapshot();
        for (index, node) in self.nodes.iter_mut().enumerate() {
            let column = index % layout::COLUMNS;
            let row = index / layout::COLUMNS;
            Arc::make_mut(node).position = Position::new(
                layout::ORIGIN_X + column as f32 * layout::COLUMN_PITCH,
                layout::ORIGIN_Y + row as f32 * layout::ROW_PITCH,
            );
        }
    }

    /// Replace the whole graph atomically (workflow import)
    pub fn set_workflow(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.take_snapshot();
        self.replace(nodes, edges);
        log::info!(
            "Workflow loaded: {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
    }

    fn replace(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        let mut ids = HashSet::new();
        self.nodes = nodes
            .into_iter()
            .filter(|n| {
                let fresh = ids.insert(n.id.clone());
                if !fresh {
                    log::warn!("Dropping duplicate node {}", n.id);
                }
                fresh
            })
            .map(Arc::new)
            .collect();
        self.edges = edges
            .into_iter()
            .filter(|e| {
                let valid = e.source != e.target && ids.contains(&e.source) && ids.contains(&e.target);
                if !valid {
                    log::warn!("Dropping dangling edge {} ({} -> {})", e.id, e.source, e.target);
                }
                valid
            })
            .collect();
        self.clear_transient();
    }

    /// Append nodes and edges without recording history.
    ///
    /// Edges go through the same propagation as [`GraphStore::connect`].
    pub fn insert_batch(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        for node in nodes {
            if self.contains(&node.id) {
                log::warn!("Ignoring duplicate node id {}", node.id);
                continue;
            }
            self.nodes.push(Arc::new(node));
        }
        for edge in edges {
            if self.can_link(&edge.source, &edge.target) {
                self.link(edge);
            } else {
                log::warn!("Skipping invalid edge {} -> {}", edge.source, edge.target);
            }
        }
    }

    fn clear_transient(&mut self) {
        self.selected_node = None;
        self.selected_edge = None;
        self.hovered_node = None;
        self.drag_origin = None;
    }

    /// Current structural state
    pub fn capture(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    fn restore(&mut self, snapshot: GraphSnapshot) {
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        self.drag_origin = None;
        if let Some(id) = self.selected_node.clone() {
            self.select_node(Some(id));
        }
        if let Some(id) = self.hovered_node.clone() {
            self.set_hovered(Some(id));
        }
        self.prune_selected_edge();
    }

    pub fn take_snapshot(&mut self) {
        let snapshot = self.capture();
        self.history.push(snapshot);
    }

    pub fn undo(&mut self) -> bool {
        let current = self.capture();
        match self.history.undo(current) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = self.capture();
        match self.history.redo(current) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}
