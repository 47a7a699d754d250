//! Error types for strand.
//!
//! Every failure the engine can surface maps to one variant here, each with
//! a stable machine-readable code so API clients can branch without parsing
//! message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for strand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// strand error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Pre-traversal structural failure of a workflow definition.
    #[error("{0}")]
    Validation(String),

    /// Missing node, missing edge, or unresolved dynamic target.
    #[error("{0}")]
    Graph(String),

    /// The traversal loop visited more nodes than the workflow allows.
    #[error("Workflow execution exceeded maximum iterations ({0})")]
    IterationLimit(u32),

    /// Parse or evaluation failure inside the template evaluator.
    #[error("{0}")]
    Template(String),

    /// An executor rejected its config or failed at runtime.
    #[error("{0}")]
    Executor(String),

    /// A nested workflow execution terminated in failure.
    #[error("{0}")]
    SubWorkflow(String),

    /// A setState rule failed to evaluate.
    #[error("{0}")]
    StateUpdate(String),

    /// The execution was cancelled cooperatively.
    #[error("Execution cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Graph(_) => "GRAPH_NAVIGATION_ERROR",
            Error::IterationLimit(_) => "ITERATION_LIMIT_ERROR",
            Error::Template(_) => "TEMPLATE_ERROR",
            Error::Executor(_) => "EXECUTOR_ERROR",
            Error::SubWorkflow(_) => "SUB_WORKFLOW_ERROR",
            Error::StateUpdate(_) => "STATE_UPDATE_ERROR",
            Error::Cancelled => "CANCELLATION_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// HTTP status the API layer maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Parse(_) => 422,
            Error::Graph(_)
            | Error::IterationLimit(_)
            | Error::Template(_)
            | Error::Executor(_)
            | Error::SubWorkflow(_)
            | Error::StateUpdate(_) => 500,
            Error::Cancelled => 409,
            Error::Http(_) => 502,
            Error::Storage(_) | Error::Database(_) | Error::Io(_) | Error::Config(_) => 500,
            Error::Json(_) | Error::Yaml(_) => 400,
        }
    }

    /// Get a sanitized message safe for external consumers.
    ///
    /// Engine-level errors carry user-facing text already; infrastructure
    /// errors are collapsed so SQL statements and file paths never leak.
    pub fn external_message(&self) -> String {
        match self {
            Error::Validation(_)
            | Error::Graph(_)
            | Error::IterationLimit(_)
            | Error::Template(_)
            | Error::Executor(_)
            | Error::SubWorkflow(_)
            | Error::StateUpdate(_)
            | Error::Cancelled
            | Error::Parse(_) => self.to_string(),

            Error::Storage(_) | Error::Database(_) => "A storage error occurred".to_string(),
            Error::Config(_) => "A configuration error occurred".to_string(),
            Error::Io(_) => "An I/O error occurred".to_string(),

            Error::Http(e) => {
                if let Some(status) = e.status() {
                    format!("HTTP request failed with status {}", status.as_u16())
                } else if e.is_timeout() {
                    "HTTP request timed out".to_string()
                } else {
                    "HTTP request failed".to_string()
                }
            }

            Error::Json(_) => "Invalid JSON".to_string(),
            Error::Yaml(_) => "Invalid YAML".to_string(),
        }
    }

    /// Convert to the API error envelope.
    pub fn to_external_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.external_message(),
            }
        })
    }
}

/// Structured error payload used in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            node_id: None,
            execution_id: None,
        }
    }

    pub fn with_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }

    pub fn with_execution(mut self, execution_id: &str) -> Self {
        self.execution_id = Some(execution_id.to_string());
        self
    }
}
