//! Linearization and request building through the public surface

use super::test_utils::{service, shop_dialogue, ScriptedTransport};
use dialogue_gen::graph::{DialogueGraph, DialogueNode, GraphHandle};
use dialogue_gen::linearize::{linearize, linearize_selection, START_NODE_PLACEHOLDER};
use dialogue_gen::types::NodeId;
use serde_json::Value;
use std::collections::BTreeSet;

fn selection(ids: &[NodeId]) -> BTreeSet<NodeId> {
    ids.iter().copied().collect()
}

#[test]
fn test_start_and_intent_lines_serialize_exactly() {
    let graph = DialogueGraph::new(vec![
        DialogueNode::new(1, false, "").with_links([2]),
        DialogueNode::new(2, true, "(ask)"),
    ])
    .unwrap();

    let json = linearize_selection(&graph, &selection(&[1, 2])).unwrap();
    let expected = format!(
        r#"{{"dialogueLines":[{{"id":1,"spokenByPlayer":false,"text":"{}","parentId":-1}},{{"id":2,"spokenByPlayer":true,"text":"(ask)","parentId":1}}]}}"#,
        START_NODE_PLACEHOLDER
    );
    assert_eq!(json, expected);
}

#[test]
fn test_lines_are_ordered_top_to_bottom_with_ties_kept() {
    let graph = shop_dialogue();
    let json = graph
        .with_graph(|g| linearize_selection(g, &selection(&[1, 2, 3, 4])))
        .unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    let lines = value["dialogueLines"].as_array().unwrap();

    let order: Vec<i64> = lines.iter().map(|l| l["id"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![1, 2, 4, 3]);

    let parents: Vec<i64> = lines.iter().map(|l| l["parentId"].as_i64().unwrap()).collect();
    assert_eq!(parents, vec![-1, 1, 1, 2]);
}

#[test]
fn test_shared_child_takes_parent_sorted_first() {
    let lines = linearize(vec![
        DialogueNode::new(11, false, "B").with_links([12]).at(5.0),
        DialogueNode::new(10, false, "A").with_links([12]).at(5.0),
        DialogueNode::new(12, true, "C").at(9.0),
    ]);
    // A and B tie on position, so B keeps its place ahead of A
    let c = lines.iter().find(|line| line.id == 12).unwrap();
    assert_eq!(c.parent_id, 11);
}

#[test]
fn test_tied_parents_resolve_in_store_order_not_id_order() {
    let graph = DialogueGraph::new(vec![
        DialogueNode::new(0, false, ""),
        DialogueNode::new(5, false, "A").with_links([7]).at(10.0),
        DialogueNode::new(3, false, "B").with_links([7]).at(10.0),
        DialogueNode::new(7, true, "C").at(20.0),
    ])
    .unwrap();

    let json = linearize_selection(&graph, &selection(&[3, 5, 7])).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    let lines = value["dialogueLines"].as_array().unwrap();

    let order: Vec<i64> = lines.iter().map(|l| l["id"].as_i64().unwrap()).collect();
    assert_eq!(order, vec![5, 3, 7]);
    assert_eq!(lines[2]["parentId"], 5);
}

#[test]
fn test_partial_selection_drops_unselected_parent() {
    let graph = shop_dialogue();
    let json = graph
        .with_graph(|g| linearize_selection(g, &selection(&[3])))
        .unwrap();
    assert!(json.contains(r#""parentId":-1"#));
    assert!(!json.contains(START_NODE_PLACEHOLDER));
}

#[test]
fn test_preview_carries_npc_context_and_lines() {
    let graph = shop_dialogue();
    let service = service(ScriptedTransport::new(Vec::new()));
    let body = service.preview_request(&graph, [1, 2, 3]).unwrap();

    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["model"], "gpt-4");
    let user = value["messages"][1]["content"].as_str().unwrap();
    let parts: Vec<&str> = user.split('\n').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[1], "NPC's disposition towards the player: Friendly");
    assert_eq!(parts[2], "NPC's description: Keeps a small general store.");
    assert!(parts[3].starts_with(r#"{"dialogueLines":"#));
    assert!(!graph.is_generating());
}

#[test]
fn test_preview_rejects_empty_selection() {
    let graph = GraphHandle::new(DialogueGraph::new(vec![DialogueNode::new(1, false, "")]).unwrap());
    let service = service(ScriptedTransport::new(Vec::new()));
    assert!(service.preview_request(&graph, Vec::new()).is_err());
}
