//! Workflow type definitions.
//!
//! A workflow is a directed graph of typed nodes joined by static or
//! dynamic edges, with designated start and end nodes and an initial state
//! mapping. The JSON surface is camelCase (`startNode`, `maxIterations`,
//! `setState`); snake_case aliases are accepted for hand-written files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::template::{EdgeCondition, Rule};

/// A complete workflow definition.
///
/// # Example JSON
///
/// ```json
/// {
///   "id": "scoring",
///   "name": "Score router",
///   "nodes": [
///     {"id": "score", "type": "transform", "config": {"value": {"v": 1}}},
///     {"id": "done", "type": "transform", "config": {"value": {"ok": true}}}
///   ],
///   "edges": [{"id": "e1", "from": "score", "to": "done"}],
///   "startNode": "score",
///   "endNode": "done"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow id (generated when omitted at creation time).
    #[serde(default)]
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// JSON-Schema-shaped mapping validated against request parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// Nodes of the graph; ids must be unique.
    pub nodes: Vec<Node>,

    /// Edges of the graph; at most one outgoing edge per node.
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Node the traversal starts at.
    #[serde(alias = "start_node")]
    pub start_node: String,

    /// Node the traversal terminates at.
    #[serde(alias = "end_node")]
    pub end_node: String,

    /// Initial workflow state, copied per execution.
    #[serde(default)]
    pub state: Map<String, Value>,

    /// Bound on node visits per traversal.
    #[serde(default = "default_max_iterations", alias = "max_iterations")]
    pub max_iterations: u32,

    /// Default config applied when the execution request names none.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "config_id")]
    pub config_id: Option<String>,
}

fn default_max_iterations() -> u32 {
    100
}

/// A processing step in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node id within the workflow.
    pub id: String,

    /// Executor type (`transform`, `http`, the reserved `workflow_executor`, …).
    #[serde(rename = "type")]
    pub node_type: String,

    /// Node configuration, treated as a template tree.
    #[serde(default)]
    pub config: Value,

    /// State updates applied after the node completes.
    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "set_state")]
    pub set_state: Vec<SetState>,

    /// Streaming policy for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamingPolicy>,
}

/// One `{key, rule}` state update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetState {
    pub key: String,
    pub rule: Rule,
}

/// Per-node streaming policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingPolicy {
    #[serde(default)]
    pub enabled: bool,

    /// Emit `node_complete` with the node output (default true).
    #[serde(default = "default_true", alias = "send_on_complete")]
    pub send_on_complete: bool,
}

fn default_true() -> bool {
    true
}

/// An edge out of a node.
///
/// Static edges name their destination; dynamic edges run a rule that must
/// produce the next node id; the conditions form picks the first entry
/// whose condition is truthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Edge {
    Static {
        id: String,
        from: String,
        to: String,
    },
    Dynamic {
        id: String,
        from: String,
        rule: Rule,
    },
    Conditional {
        id: String,
        from: String,
        conditions: Vec<EdgeCondition>,
    },
}

impl Edge {
    pub fn id(&self) -> &str {
        match self {
            Edge::Static { id, .. } | Edge::Dynamic { id, .. } | Edge::Conditional { id, .. } => id,
        }
    }

    pub fn from(&self) -> &str {
        match self {
            Edge::Static { from, .. }
            | Edge::Dynamic { from, .. }
            | Edge::Conditional { from, .. } => from,
        }
    }
}

impl Workflow {
    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Build the id → node lookup map used by traversal.
    pub fn node_index(&self) -> HashMap<&str, &Node> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    /// Build the from-id → edge lookup map used by traversal.
    ///
    /// The validator guarantees at most one outgoing edge per node before
    /// this map is consulted.
    pub fn edge_index(&self) -> HashMap<&str, &Edge> {
        self.edges.iter().map(|e| (e.from(), e)).collect()
    }

    /// All executor types used by this workflow.
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.nodes.iter().map(|n| n.node_type.as_str()).collect();
        types.sort();
        types.dedup();
        types
    }
}
