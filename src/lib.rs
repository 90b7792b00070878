//! StarNarrator Infinite Canvas
//!
//! A typed node graph for AI storyboarding. Script, text, character, image and
//! video nodes are wired together on a canvas; edges decide how character
//! identity and style text flow into each generation prompt. Generation runs
//! asynchronously against remote services behind the traits in [`adapters`].

#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod interaction;
pub mod media;
pub mod mock;
pub mod models;
pub mod nodes;
pub mod persist;
pub mod poll;
pub mod prompt;
pub mod remote;
pub mod script;

pub use config::StudioConfig;
pub use engine::{Adapters, EngineSettings, Studio};
pub use error::{AdapterError, ConfigError, NodeError, PersistError};
pub use graph::GraphStore;
pub use nodes::{Connection, Edge, EdgeId, Node, NodeId, NodeKind, NodePatch, NodeStatus, NodeType, Position};
