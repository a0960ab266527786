//! Line Linearizer
//!
//! Flattens a selected subset of a dialogue graph into an ordered, parent-annotated
//! list of lines and serializes it into the compact `{"dialogueLines":[...]}` fragment
//! sent to the completion service.

use crate::error::GenerationError;
use crate::graph::{DialogueNode, GraphAccessor};
use crate::types::{NodeId, NO_PARENT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Text sent in place of the Start node's own text
pub const START_NODE_PLACEHOLDER: &str =
    "(this is a utility dialogue line that STARTS the conversation, no text is needed here)";

fn no_parent() -> NodeId {
    NO_PARENT
}

/// One dialogue line as exchanged with the completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueLine {
    pub id: NodeId,
    #[serde(default)]
    pub spoken_by_player: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default = "no_parent")]
    pub parent_id: NodeId,
}

/// The `{"dialogueLines": [...]}` document, both outbound and inside the reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueLines {
    pub dialogue_lines: Vec<DialogueLine>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DialogueLinesRef<'a> {
    dialogue_lines: &'a [DialogueLine],
}

/// Resolve the selected ids against the graph, substituting the Start node.
///
/// Nodes come back in store order, which decides the parent among equally placed
/// candidates. Ids that no longer resolve are dropped. The Start node keeps its
/// id, speaker and links, but carries the fixed placeholder text.
pub fn collect_request_nodes<A: GraphAccessor + ?Sized>(
    graph: &A,
    selected: &BTreeSet<NodeId>,
) -> Vec<DialogueNode> {
    let mut nodes = Vec::with_capacity(selected.len());
    for id in graph.node_ids() {
        if !selected.contains(&id) {
            continue;
        }
        let Some(found) = graph.lookup_by_id(id) else {
            continue;
        };
        if found.is_start() {
            nodes.push(DialogueNode {
                text: START_NODE_PLACEHOLDER.to_string(),
                ..found.node
            });
        } else {
            nodes.push(found.node);
        }
    }
    if nodes.len() < selected.len() {
        let missing: Vec<NodeId> = selected
            .iter()
            .copied()
            .filter(|id| !nodes.iter().any(|node| node.id == *id))
            .collect();
        debug!(?missing, "Selected nodes no longer exist, skipping");
    }
    nodes
}

/// Vertical position with `-0.0` folded into `0.0`
fn sort_key(node: &DialogueNode) -> f32 {
    if node.vertical_position == 0.0 {
        0.0
    } else {
        node.vertical_position
    }
}

/// Order nodes top to bottom and attach each one's first parent
pub fn linearize(mut nodes: Vec<DialogueNode>) -> Vec<DialogueLine> {
    // sort_by is stable: equal positions keep their incoming order
    nodes.sort_by(|a, b| sort_key(a).total_cmp(&sort_key(b)));

    let mut parents_of: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in &nodes {
        for &child in &node.links {
            parents_of.entry(child).or_default().push(node.id);
        }
    }

    nodes
        .into_iter()
        .map(|node| {
            let parent_id = parents_of
                .get(&node.id)
                .and_then(|parents| parents.first().copied())
                .unwrap_or(NO_PARENT);
            DialogueLine {
                id: node.id,
                spoken_by_player: node.is_player,
                text: node.text,
                parent_id,
            }
        })
        .collect()
}

/// Serialize lines without insignificant whitespace
pub fn to_compact_json(lines: &[DialogueLine]) -> Result<String, GenerationError> {
    Ok(serde_json::to_string(&DialogueLinesRef {
        dialogue_lines: lines,
    })?)
}

/// Collect, linearize and serialize a selection in one step
pub fn linearize_selection<A: GraphAccessor + ?Sized>(
    graph: &A,
    selected: &BTreeSet<NodeId>,
) -> Result<String, GenerationError> {
    let lines = linearize(collect_request_nodes(graph, selected));
    to_compact_json(&lines)
}
