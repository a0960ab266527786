//! Dialogue Graph
//!
//! In-memory dialogue graph, the accessor contract the generation pipeline depends on,
//! and the shared handle through which hosts and jobs reach a graph. Node order matters:
//! the node stored at index 0 is the Start node.

use crate::error::GraphError;
use crate::types::{GraphId, NodeId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Position of the Start node in the node store
pub const START_NODE_INDEX: usize = 0;

/// Disposition value meaning "no disposition set"
pub const DEFAULT_DISPOSITION: &str = "Undefined";

/// A single dialogue node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: NodeId,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub text: String,
    /// Outgoing edges, in author order
    #[serde(default)]
    pub links: Vec<NodeId>,
    /// Layout coordinate; only used to order lines for the service
    #[serde(default)]
    pub vertical_position: f32,
}

impl DialogueNode {
    pub fn new(id: NodeId, is_player: bool, text: impl Into<String>) -> Self {
        Self {
            id,
            is_player,
            text: text.into(),
            links: Vec::new(),
            vertical_position: 0.0,
        }
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = NodeId>) -> Self {
        self.links = links.into_iter().collect();
        self
    }

    pub fn at(mut self, vertical_position: f32) -> Self {
        self.vertical_position = vertical_position;
        self
    }
}

/// Result of a successful lookup: the node and where it sits in the store
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLookup {
    pub node: DialogueNode,
    pub index: usize,
}

impl NodeLookup {
    pub fn is_start(&self) -> bool {
        self.index == START_NODE_INDEX
    }
}

/// Access to a dialogue graph
///
/// Lookups are read-only. `commit_text` is the only mutation the generation
/// pipeline performs; it returns whether the text actually changed.
pub trait GraphAccessor {
    fn lookup_by_id(&self, id: NodeId) -> Option<NodeLookup>;

    /// Every node id, in store order
    fn node_ids(&self) -> Vec<NodeId>;

    fn commit_text(&mut self, id: NodeId, text: &str) -> bool;

    fn outgoing_links(&self, id: NodeId) -> Vec<NodeId> {
        self.lookup_by_id(id)
            .map(|found| found.node.links)
            .unwrap_or_default()
    }
}

fn default_disposition() -> String {
    DEFAULT_DISPOSITION.to_string()
}

/// Dialogue document: ordered nodes plus the NPC context sent with each request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueGraph {
    nodes: Vec<DialogueNode>,
    #[serde(default = "default_disposition")]
    pub npc_disposition: String,
    #[serde(default)]
    pub description: String,
}

impl DialogueGraph {
    /// Build a graph, rejecting duplicate node ids
    pub fn new(nodes: Vec<DialogueNode>) -> Result<Self, GraphError> {
        let graph = Self {
            nodes,
            npc_disposition: default_disposition(),
            description: String::new(),
        };
        graph.check_unique_ids()?;
        Ok(graph)
    }

    pub fn with_npc_context(
        mut self,
        disposition: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.npc_disposition = disposition.into();
        self.description = description.into();
        self
    }

    pub fn nodes(&self) -> &[DialogueNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn start_node(&self) -> Option<&DialogueNode> {
        self.nodes.get(START_NODE_INDEX)
    }

    /// Remove a node and every link pointing at it
    pub fn remove_node(&mut self, id: NodeId) -> Result<DialogueNode, GraphError> {
        let index = self
            .index_of(id)
            .ok_or(GraphError::NodeNotFound(id))?;
        let removed = self.nodes.remove(index);
        for node in &mut self.nodes {
            node.links.retain(|link| *link != id);
        }
        Ok(removed)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        let graph: DialogueGraph = serde_json::from_str(json)?;
        graph.check_unique_ids()?;
        Ok(graph)
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    fn check_unique_ids(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
        }
        Ok(())
    }
}

impl GraphAccessor for DialogueGraph {
    fn lookup_by_id(&self, id: NodeId) -> Option<NodeLookup> {
        self.index_of(id).map(|index| NodeLookup {
            node: self.nodes[index].clone(),
            index,
        })
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    fn commit_text(&mut self, id: NodeId, text: &str) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let node = &mut self.nodes[index];
        if node.text == text {
            return false;
        }
        node.text = text.to_string();
        true
    }
}

struct GraphCell {
    id: GraphId,
    graph: Mutex<DialogueGraph>,
    generating: AtomicBool,
    refresh_details: AtomicBool,
    /// Bumped whenever the owning editor context is torn down
    epoch: AtomicU64,
}

/// Shared, owning handle to a dialogue graph
///
/// All reads and writes go through the graph lock, which stands in for the host's
/// owning thread: a job never touches graph state without holding it.
#[derive(Clone)]
pub struct GraphHandle {
    cell: Arc<GraphCell>,
}

impl GraphHandle {
    pub fn new(graph: DialogueGraph) -> Self {
        Self {
            cell: Arc::new(GraphCell {
                id: GraphId::next(),
                graph: Mutex::new(graph),
                generating: AtomicBool::new(false),
                refresh_details: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> GraphId {
        self.cell.id
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&DialogueGraph) -> R) -> R {
        let graph = self.cell.graph.lock();
        f(&graph)
    }

    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut DialogueGraph) -> R) -> R {
        let mut graph = self.cell.graph.lock();
        f(&mut graph)
    }

    pub fn snapshot(&self) -> DialogueGraph {
        self.cell.graph.lock().clone()
    }

    pub fn is_generating(&self) -> bool {
        self.cell.generating.load(Ordering::Acquire)
    }

    /// Consume the "details changed" hint raised by a merge
    pub fn take_refresh_details(&self) -> bool {
        self.cell.refresh_details.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn mark_details_changed(&self) {
        self.cell.refresh_details.store(true, Ordering::Release);
    }

    /// Tear down the owning context. Outstanding `GraphRef`s stop resolving.
    pub fn invalidate(&self) {
        let epoch = self.cell.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(graph_id = self.cell.id.as_u64(), epoch, "Graph owner invalidated");
    }

    /// Weak back-reference bound to the current owner epoch
    pub fn downgrade(&self) -> GraphRef {
        GraphRef {
            cell: Arc::downgrade(&self.cell),
            epoch: self.cell.epoch.load(Ordering::Acquire),
        }
    }

    /// Acquire the graph's generating flag, or `None` if a job already holds it
    pub fn try_begin_generation(&self) -> Option<GeneratingGuard> {
        self.cell
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GeneratingGuard {
                cell: Arc::downgrade(&self.cell),
            })
    }
}

/// Weak back-reference from a job to its graph
#[derive(Clone)]
pub struct GraphRef {
    cell: Weak<GraphCell>,
    epoch: u64,
}

impl GraphRef {
    /// Resolve to a live handle; `None` once the graph is dropped or its owner invalidated
    pub fn resolve(&self) -> Option<GraphHandle> {
        let cell = self.cell.upgrade()?;
        if cell.epoch.load(Ordering::Acquire) != self.epoch {
            return None;
        }
        Some(GraphHandle { cell })
    }

    pub fn is_valid(&self) -> bool {
        self.resolve().is_some()
    }
}

/// Scoped hold on a graph's generating flag; dropping it clears the flag
#[must_use = "dropping the guard immediately releases the generating flag"]
pub struct GeneratingGuard {
    cell: Weak<GraphCell>,
}

impl Drop for GeneratingGuard {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.generating.store(false, Ordering::Release);
            debug!(graph_id = cell.id.as_u64(), "Generating flag released");
        }
    }
}
