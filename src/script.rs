//! Script expansion: one LLM analysis turned into a batch of nodes and edges

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::{ResponseFormat, TextEngine, TextEngineSettings};
use crate::error::NodeError;
use crate::nodes::{Edge, Node, NodeId, NodeType, Position};

pub const ANALYSIS_PROMPT: &str = "You are a storyboard assistant. Break the script you are given \
into the characters that appear, the environments where it takes place and an ordered list of shots. \
Give every character and environment a short unique id. Each shot has an image prompt describing \
what the camera sees and lists the ids of the characters and environments it shows.";

/// Horizontal distance between columns of generated nodes
pub const COLUMN_GAP: f32 = 360.0;
pub const ROW_GAP: f32 = 240.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisCharacter {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisEnvironment {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisShot {
    pub id: String,
    pub prompt: String,
    #[serde(alias = "character_ids")]
    pub character_ids: Vec<String>,
    #[serde(alias = "environment_ids")]
    pub environment_ids: Vec<String>,
}

/// Structured answer of the analysis model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptAnalysis {
    pub characters: Vec<AnalysisCharacter>,
    pub environments: Vec<AnalysisEnvironment>,
    pub shots: Vec<AnalysisShot>,
}

pub fn analysis_schema() -> serde_json::Value {
    let entity = json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" },
            "description": { "type": "string" }
        },
        "required": ["id", "name", "description"],
        "additionalProperties": false
    });
    json!({
        "type": "object",
        "properties": {
            "characters": { "type": "array", "items": entity.clone() },
            "environments": { "type": "array", "items": entity },
            "shots": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "prompt": { "type": "string" },
                        "characterIds": { "type": "array", "items": { "type": "string" } },
                        "environmentIds": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["id", "prompt", "characterIds", "environmentIds"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["characters", "environments", "shots"],
        "additionalProperties": false
    })
}

/// Parse the model's answer, tolerating a surrounding markdown code fence
pub fn parse_analysis(raw: &str) -> Result<ScriptAnalysis, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub async fn analyze(
    engine: &dyn TextEngine,
    settings: &TextEngineSettings,
    script: &str,
) -> Result<ScriptAnalysis, NodeError> {
    let format = ResponseFormat::JsonSchema {
        name: "script_analysis".to_string(),
        schema: analysis_schema(),
    };
    let raw = engine.chat(settings, ANALYSIS_PROMPT, script, &format).await?;
    Ok(parse_analysis(&raw)?)
}

/// Nodes and edges for one analysis, placed in columns right of `script`.
///
/// Columns: style text, characters, environments, shots. Shot references to
/// unknown ids are skipped.
pub fn build_subgraph(
    script: &Node,
    style: &str,
    analysis: &ScriptAnalysis,
) -> (Vec<Node>, Vec<Edge>) {
    let origin = script.position;
    let at = |column: usize, row: usize| {
        Position::new(
            origin.x + COLUMN_GAP * (column as f32 + 1.0),
            origin.y + ROW_GAP * row as f32,
        )
    };

    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    let style_node = Node::new(NodeType::Text, at(0, 0))
        .with_label("Style")
        .with_content(style);
    let style_id = style_node.id.clone();
    edges.push(Edge::new(script.id.clone(), style_id.clone()));
    nodes.push(style_node);

    let mut refs: HashMap<&str, NodeId> = HashMap::new();

    for (row, character) in analysis.characters.iter().enumerate() {
        let node = Node::new(NodeType::Character, at(1, row))
            .with_label(&character.name)
            .with_content(describe(&character.name, &character.description));
        refs.insert(character.id.as_str(), node.id.clone());
        edges.push(Edge::new(script.id.clone(), node.id.clone()));
        nodes.push(node);
    }

    for (row, environment) in analysis.environments.iter().enumerate() {
        let node = Node::new(NodeType::Image, at(2, row))
            .with_label(&environment.name)
            .with_content(&environment.description);
        refs.insert(environment.id.as_str(), node.id.clone());
        edges.push(Edge::new(script.id.clone(), node.id.clone()));
        edges.push(Edge::new(style_id.clone(), node.id.clone()));
        nodes.push(node);
    }

    for (row, shot) in analysis.shots.iter().enumerate() {
        let label = if shot.id.is_empty() {
            format!("Shot {}", row + 1)
        } else {
            format!("Shot {}", shot.id)
        };
        let node = Node::new(NodeType::Image, at(3, row))
            .with_label(label)
            .with_content(&shot.prompt);

        let mut linked = false;
        for reference in shot.character_ids.iter().chain(&shot.environment_ids) {
            match refs.get(reference.as_str()) {
                Some(source) => {
                    edges.push(Edge::new(source.clone(), node.id.clone()));
                    linked = true;
                }
                None => log::warn!("Shot {:?} references unknown id {:?}", shot.id, reference),
            }
        }
        edges.push(Edge::new(style_id.clone(), node.id.clone()));
        if !linked {
            edges.push(Edge::new(script.id.clone(), node.id.clone()));
        }
        nodes.push(node);
    }

    (nodes, edges)
}

fn describe(name: &str, description: &str) -> String {
    match (name.is_empty(), description.is_empty()) {
        (false, false) => format!("{}: {}", name, description),
        (false, true) => name.to_string(),
        _ => description.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"{
        "characters": [{"id": "c1", "name": "Mara", "description": "a tired courier"}],
        "environments": [{"id": "e1", "name": "Docks", "description": "foggy harbour at dawn"}],
        "shots": [
            {"id": "s1", "prompt": "Mara waits on the pier", "characterIds": ["c1"], "environmentIds": ["e1", "e9"]},
            {"id": "s2", "prompt": "gulls over the water", "characterIds": [], "environmentIds": []}
        ]
    }"#;

    fn targets_of<'a>(edges: &'a [Edge], source: &'a NodeId) -> Vec<&'a NodeId> {
        edges
            .iter()
            .filter(|e| &e.source == source)
            .map(|e| &e.target)
            .collect()
    }

    #[test]
    fn fenced_json_parses() {
        let fenced = format!("```json\n{}\n```", ANALYSIS);
        assert_eq!(parse_analysis(&fenced).unwrap(), parse_analysis(ANALYSIS).unwrap());
        assert!(parse_analysis("not json").is_err());
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let analysis = parse_analysis(r#"{"characters": []}"#).unwrap();
        assert!(analysis.shots.is_empty());
    }

    #[test]
    fn subgraph_shape() {
        let script = Node::new(NodeType::Script, Position::new(0.0, 0.0)).with_id("script-1");
        let analysis = parse_analysis(ANALYSIS).unwrap();
        let (nodes, edges) = build_subgraph(&script, "noir, high contrast", &analysis);

        // style + 1 character + 1 environment + 2 shots
        assert_eq!(nodes.len(), 5);
        let style = &nodes[0];
        assert_eq!(style.node_type(), NodeType::Text);
        assert_eq!(style.data.content, "noir, high contrast");
        let (character, environment, linked_shot, lonely_shot) =
            (&nodes[1], &nodes[2], &nodes[3], &nodes[4]);
        assert_eq!(character.node_type(), NodeType::Character);
        assert_eq!(environment.node_type(), NodeType::Image);

        let from_script = targets_of(&edges, &script.id);
        assert!(from_script.contains(&&style.id));
        assert!(from_script.contains(&&character.id));
        assert!(from_script.contains(&&environment.id));
        assert!(from_script.contains(&&lonely_shot.id));
        assert!(!from_script.contains(&&linked_shot.id));

        let from_style = targets_of(&edges, &style.id);
        assert_eq!(from_style, vec![&environment.id, &linked_shot.id, &lonely_shot.id]);
        assert_eq!(targets_of(&edges, &character.id), vec![&linked_shot.id]);
        assert_eq!(targets_of(&edges, &environment.id), vec![&linked_shot.id]);
        // unknown "e9" skipped
        assert_eq!(edges.len(), 9);
    }

    #[test]
    fn new_nodes_sit_right_of_the_script() {
        let script = Node::new(NodeType::Script, Position::new(50.0, 80.0));
        let (nodes, _) = build_subgraph(&script, "", &parse_analysis(ANALYSIS).unwrap());
        assert!(nodes.iter().all(|n| n.position.x > script.position.x));
        assert_eq!(nodes[0].position, Position::new(50.0 + COLUMN_GAP, 80.0));
    }
}
