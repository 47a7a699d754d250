//! Workflow validation.
//!
//! Structural checks run before traversal. Cycles are legal by design;
//! reachability is not analyzed.

use std::collections::{HashMap, HashSet};

use super::types::{Edge, Workflow};
use crate::error::{Error, Result};

/// Validate a workflow definition prior to execution.
///
/// Checks:
/// - node ids are unique;
/// - `startNode` and `endNode` refer to existing nodes;
/// - every edge's `from` refers to an existing node;
/// - every static edge's `to` refers to an existing node;
/// - no node has more than one outgoing edge;
/// - `maxIterations` is positive.
pub fn validate_workflow(workflow: &Workflow) -> Result<()> {
    let mut ids = HashSet::new();
    for node in &workflow.nodes {
        if node.id.is_empty() {
            return Err(Error::Validation("Node ID cannot be empty".into()));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(Error::Validation(format!("Duplicate node ID: {}", node.id)));
        }
        if node.node_type.is_empty() {
            return Err(Error::Validation(format!(
                "Node '{}' has empty type",
                node.id
            )));
        }
    }

    if !ids.contains(workflow.start_node.as_str()) {
        return Err(Error::Validation(format!(
            "Start node '{}' does not exist in workflow",
            workflow.start_node
        )));
    }
    if !ids.contains(workflow.end_node.as_str()) {
        return Err(Error::Validation(format!(
            "End node '{}' does not exist in workflow",
            workflow.end_node
        )));
    }

    let mut outgoing: HashMap<&str, u32> = HashMap::new();
    for edge in &workflow.edges {
        if !ids.contains(edge.from()) {
            return Err(Error::Validation(format!(
                "Edge '{}' references non-existent 'from' node: {}",
                edge.id(),
                edge.from()
            )));
        }
        if let Edge::Static { id, to, .. } = edge {
            if !ids.contains(to.as_str()) {
                return Err(Error::Validation(format!(
                    "Edge '{}' references non-existent 'to' node: {}",
                    id, to
                )));
            }
        }
        *outgoing.entry(edge.from()).or_default() += 1;
    }

    for (from, count) in outgoing {
        if count > 1 {
            return Err(Error::Validation(format!(
                "Node '{}' has {} outgoing edges. Each node can only have one outgoing edge.",
                from, count
            )));
        }
    }

    if workflow.max_iterations == 0 {
        return Err(Error::Validation(
            "maxIterations must be positive".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::parse_workflow;

    fn linear() -> String {
        serde_json::json!({
            "id": "wf",
            "name": "linear",
            "nodes": [
                {"id": "a", "type": "transform"},
                {"id": "b", "type": "transform"}
            ],
            "edges": [{"id": "e1", "from": "a", "to": "b"}],
            "startNode": "a",
            "endNode": "b"
        })
        .to_string()
    }

    #[test]
    fn test_valid_workflow() {
        let workflow = parse_workflow(&linear()).unwrap();
        assert!(validate_workflow(&workflow).is_ok());
    }

    #[test]
    fn test_missing_start_node() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.start_node = "ghost".to_string();
        let err = validate_workflow(&workflow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Start node 'ghost' does not exist in workflow"
        );
    }

    #[test]
    fn test_missing_end_node() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.end_node = "ghost".to_string();
        let err = validate_workflow(&workflow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "End node 'ghost' does not exist in workflow"
        );
    }

    #[test]
    fn test_duplicate_node_ids() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.nodes.push(workflow.nodes[0].clone());
        let err = validate_workflow(&workflow).unwrap_err();
        assert!(err.to_string().contains("Duplicate node ID: a"));
    }

    #[test]
    fn test_edge_from_must_exist() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.edges.push(Edge::Static {
            id: "e2".to_string(),
            from: "ghost".to_string(),
            to: "b".to_string(),
        });
        let err = validate_workflow(&workflow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Edge 'e2' references non-existent 'from' node: ghost"
        );
    }

    #[test]
    fn test_static_edge_to_must_exist() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.edges[0] = Edge::Static {
            id: "e1".to_string(),
            from: "a".to_string(),
            to: "ghost".to_string(),
        };
        let err = validate_workflow(&workflow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Edge 'e1' references non-existent 'to' node: ghost"
        );
    }

    #[test]
    fn test_multiple_outgoing_edges_rejected() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.edges.push(Edge::Static {
            id: "e2".to_string(),
            from: "a".to_string(),
            to: "b".to_string(),
        });
        let err = validate_workflow(&workflow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Node 'a' has 2 outgoing edges. Each node can only have one outgoing edge."
        );
    }

    #[test]
    fn test_cycles_are_legal() {
        let json = serde_json::json!({
            "id": "wf",
            "name": "loop",
            "nodes": [
                {"id": "a", "type": "transform"},
                {"id": "b", "type": "transform"}
            ],
            "edges": [
                {"id": "e1", "from": "a", "to": "a"}
            ],
            "startNode": "a",
            "endNode": "b"
        })
        .to_string();
        let workflow = parse_workflow(&json).unwrap();
        assert!(validate_workflow(&workflow).is_ok());
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let mut workflow = parse_workflow(&linear()).unwrap();
        workflow.max_iterations = 0;
        assert!(validate_workflow(&workflow).is_err());
    }
}
