use std::path::PathBuf;

use starnarrator_canvas::prompt::effective_prompt;
use starnarrator_canvas::{persist, Connection, GraphStore, Node, NodeId, NodeType, Position};

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}.json", name, uuid::Uuid::new_v4().simple()))
}

#[test]
fn workflow_survives_save_and_load() {
    let mut store = GraphStore::new();
    store.add_node(
        Node::new(NodeType::Character, Position::new(0.0, 0.0))
            .with_id("A")
            .with_content("Knight")
            .with_identity_prompt("A knight in silver armor")
            .with_seed(42),
    );
    store.add_node(
        Node::new(NodeType::Text, Position::new(0.0, 400.0))
            .with_id("B")
            .with_content("oil painting style"),
    );
    store.add_node(
        Node::new(NodeType::Video, Position::new(320.0, 0.0))
            .with_id("C")
            .with_content("standing in a forest"),
    );
    store.connect(Connection::new("A", "C"));
    store.connect(Connection::new("B", "C"));

    let path = scratch_file("workflow");
    persist::save(&store, &path).unwrap();
    let loaded = persist::load(&path, 30).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.node_count(), 3);
    assert_eq!(loaded.edges(), store.edges());
    assert!(!loaded.can_undo());
    let video = loaded.node(&NodeId::from("C")).unwrap();
    assert_eq!(video.video_config().unwrap().seed, Some(42));
    assert_eq!(video.video_config().unwrap().character_ref.as_deref(), Some("Knight"));
    assert_eq!(
        effective_prompt(&loaded, &NodeId::from("C")).unwrap(),
        "Context: (A knight in silver armor), standing in a forest, oil painting style"
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let err = persist::load(&scratch_file("absent"), 30).unwrap_err();
    assert!(matches!(err, starnarrator_canvas::PersistError::Io(_)));
}
