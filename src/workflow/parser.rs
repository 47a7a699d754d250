//! Workflow definition parser.
//!
//! Definitions are JSON on the API surface; YAML is accepted for files
//! created through the CLI.

use std::path::Path;

use super::types::Workflow;
use crate::error::{Error, Result};

/// Parse a workflow from a JSON or YAML definition string.
pub fn parse_workflow(definition: &str) -> Result<Workflow> {
    let trimmed = definition.trim();
    if trimmed.is_empty() {
        return Err(Error::Parse("Empty workflow definition".to_string()));
    }

    let result = if trimmed.starts_with('{') {
        serde_json::from_str::<Workflow>(trimmed).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str::<Workflow>(trimmed).map_err(|e| e.to_string())
    };

    result.map_err(|msg| {
        if let Some(field) = extract_missing_field(&msg) {
            Error::Parse(format!("Missing required field: {}", field))
        } else {
            Error::Parse(format!("Invalid workflow definition: {}", msg))
        }
    })
}

/// Parse a workflow from a file path.
pub fn parse_workflow_file(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

fn extract_missing_field(error_message: &str) -> Option<&str> {
    let marker = "missing field `";
    let start = error_message.find(marker)? + marker.len();
    let rest = &error_message[start..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_workflow() {
        let json = r#"{
            "id": "wf-1",
            "name": "demo",
            "nodes": [{"id": "a", "type": "transform", "config": {"value": 1}}],
            "startNode": "a",
            "endNode": "a"
        }"#;

        let workflow = parse_workflow(json).unwrap();
        assert_eq!(workflow.id, "wf-1");
        assert_eq!(workflow.nodes.len(), 1);
    }

    #[test]
    fn test_parse_yaml_workflow() {
        let yaml = r#"
id: wf-2
name: demo-yaml
nodes:
  - id: a
    type: transform
  - id: b
    type: transform
edges:
  - id: e1
    from: a
    to: b
startNode: a
endNode: b
"#;

        let workflow = parse_workflow(yaml).unwrap();
        assert_eq!(workflow.name, "demo-yaml");
        assert_eq!(workflow.edges.len(), 1);
    }

    #[test]
    fn test_parse_empty_definition() {
        let err = parse_workflow("  ").unwrap_err();
        assert!(err.to_string().contains("Empty workflow definition"));
    }

    #[test]
    fn test_parse_missing_required_field() {
        let err = parse_workflow(r#"{"nodes": []}"#).unwrap_err();
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_workflow("{broken").unwrap_err();
        assert!(err.to_string().contains("Invalid workflow definition"));
    }
}
