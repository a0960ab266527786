//! Merge policy for generated lines.
//!
//! Generated text only lands on nodes that were part of the request, are not the
//! Start node, and still hold placeholder text. Authored lines are never overwritten.

use crate::graph::GraphAccessor;
use crate::linearize::DialogueLine;
use crate::types::NodeId;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// What happened to each returned line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Nodes whose text was replaced
    pub applied: Vec<NodeId>,
    /// Ids the graph no longer (or never) contained
    pub missing: Vec<NodeId>,
    /// The Start node, which is never written
    pub start: Vec<NodeId>,
    /// Ids the service returned that were not part of the request
    pub unselected: Vec<NodeId>,
    /// Nodes holding authored text
    pub authored: Vec<NodeId>,
    /// Nodes whose text already matched
    pub unchanged: Vec<NodeId>,
}

impl MergeReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.missing.len()
            + self.start.len()
            + self.unselected.len()
            + self.authored.len()
            + self.unchanged.len()
    }

    pub fn changed_anything(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Empty, or an intent written as `(...)`
pub fn is_placeholder_text(text: &str) -> bool {
    text.is_empty() || (text.len() >= 2 && text.starts_with('(') && text.ends_with(')'))
}

/// Apply generated lines to the graph.
///
/// Lines are applied in reply order. Whether a node may be replaced is judged on
/// the text it held before this merge, so when the service repeats an id the last
/// line wins.
pub fn merge_lines<A: GraphAccessor + ?Sized>(
    graph: &mut A,
    selected: &BTreeSet<NodeId>,
    lines: &[DialogueLine],
) -> MergeReport {
    let mut report = MergeReport::default();
    let mut original_text: HashMap<NodeId, String> = HashMap::new();

    for line in lines {
        let Some(found) = graph.lookup_by_id(line.id) else {
            debug!(node_id = line.id, "Generated line refers to a missing node");
            report.missing.push(line.id);
            continue;
        };

        if found.is_start() {
            report.start.push(line.id);
            continue;
        }

        if !selected.contains(&line.id) {
            debug!(node_id = line.id, "Generated line was not requested, ignoring");
            report.unselected.push(line.id);
            continue;
        }

        let current = found.node.text;
        let before = original_text
            .entry(line.id)
            .or_insert_with(|| current.clone());
        if current == line.text {
            report.unchanged.push(line.id);
        } else if !is_placeholder_text(before) {
            trace!(node_id = line.id, "Keeping authored text");
            report.authored.push(line.id);
        } else if graph.commit_text(line.id, &line.text) {
            if !report.applied.contains(&line.id) {
                report.applied.push(line.id);
            }
        } else {
            report.unchanged.push(line.id);
        }
    }

    report
}
