//! Canvas interaction without a renderer: viewport mapping and the
//! drag-a-connection-to-empty-space quick-add flow.

use crate::graph::GraphStore;
use crate::nodes::{Connection, EdgeId, Node, NodeId, NodeType, Position};

/// Node types offered when a connection is dropped on empty canvas
pub const QUICK_ADD_TYPES: [NodeType; 4] = [
    NodeType::Text,
    NodeType::Character,
    NodeType::Image,
    NodeType::Video,
];

/// Pan and zoom of the canvas view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    fn zoom(&self) -> f32 {
        if self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }

    pub fn to_canvas(&self, screen: Position) -> Position {
        let zoom = self.zoom();
        Position::new((screen.x - self.x) / zoom, (screen.y - self.y) / zoom)
    }

    pub fn to_screen(&self, canvas: Position) -> Position {
        let zoom = self.zoom();
        Position::new(canvas.x * zoom + self.x, canvas.y * zoom + self.y)
    }
}

/// What the pointer was over when the drag ended, as hit-tested by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum DropTarget {
    Handle(NodeId),
    Node(NodeId),
    EmptyCanvas { screen: Position },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuickAddMenu {
    pub source: NodeId,
    pub screen: Position,
    pub canvas: Position,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { source: NodeId },
    QuickAdd(QuickAddMenu),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    Connected(EdgeId),
    MenuOpened,
    Discarded,
    /// Released while no drag was in progress
    Ignored,
}

/// Tracks one connection drag from a node's output handle
#[derive(Debug, Clone, Default)]
pub struct ConnectionDrag {
    state: DragState,
    viewport: Viewport,
}

impl ConnectionDrag {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: DragState::Idle,
            viewport,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn menu(&self) -> Option<&QuickAddMenu> {
        match &self.state {
            DragState::QuickAdd(menu) => Some(menu),
            _ => None,
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Begin dragging from `source`; replaces any open menu
    pub fn start(&mut self, source: NodeId) {
        self.state = DragState::Dragging { source };
    }

    pub fn release(&mut self, store: &mut GraphStore, target: DropTarget) -> DragOutcome {
        let DragState::Dragging { source } = std::mem::take(&mut self.state) else {
            return DragOutcome::Ignored;
        };
        match target {
            DropTarget::Handle(target) => match store.connect(Connection { source, target }) {
                Some(edge) => DragOutcome::Connected(edge),
                None => DragOutcome::Discarded,
            },
            DropTarget::Node(_) => DragOutcome::Discarded,
            DropTarget::EmptyCanvas { screen } => {
                let canvas = self.viewport.to_canvas(screen);
                self.state = DragState::QuickAdd(QuickAddMenu {
                    source,
                    screen,
                    canvas,
                });
                DragOutcome::MenuOpened
            }
        }
    }

    /// Create a node of `node_type` at the drop point and wire it to the source.
    ///
    /// `None` (menu stays open) for types the menu does not offer. If the
    /// source node was deleted while the menu was open, nothing is created
    /// and the menu closes.
    pub fn choose(&mut self, store: &mut GraphStore, node_type: NodeType) -> Option<(NodeId, EdgeId)> {
        if !QUICK_ADD_TYPES.contains(&node_type) {
            log::warn!("{} is not offered by quick-add", node_type);
            return None;
        }
        let DragState::QuickAdd(menu) = std::mem::take(&mut self.state) else {
            return None;
        };
        if !store.contains(&menu.source) {
            log::warn!("Quick-add source {} no longer exists", menu.source);
            return None;
        }
        let node = Node::new(node_type, menu.canvas);
        let id = node.id.clone();
        store.add_node(node);
        let edge = store.connect(Connection::new(menu.source, id.clone()))?;
        Some((id, edge))
    }

    pub fn dismiss(&mut self) {
        self.state = DragState::Idle;
    }
}
