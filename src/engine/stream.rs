//! Live event stream for executions.
//!
//! Each streamed execution gets an `EventSink` wrapping an unbounded
//! channel; the orchestrator tags every event with the envelope
//! `{type, timestamp, workflowId, executionId, depth, path, …}` and the
//! API encodes the receiver side as SSE `data:` lines. Nested executions
//! share the parent's sink with `depth + 1` and an extended path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Kinds of stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStart,
    WorkflowComplete,
    NodeStart,
    NodeChunk,
    NodeComplete,
    StateUpdated,
    Error,
}

/// One event on the live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub execution_id: String,
    pub depth: u32,
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Envelope identifying a nested execution inside a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingContext {
    pub execution_id: String,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    pub path: Vec<String>,
}

/// Sending half of an execution's event stream.
///
/// Emission never blocks and never fails: a dropped receiver simply makes
/// further events no-ops.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    /// Create a sink and its receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }
}

/// Per-traversal emission scope: the sink plus the envelope fields shared
/// by every event at this depth.
#[derive(Clone)]
pub struct StreamScope {
    sink: EventSink,
    workflow_id: String,
    execution_id: String,
    depth: u32,
    path: Vec<String>,
    parent_execution_id: Option<String>,
}

impl StreamScope {
    /// Scope for a top-level execution.
    pub fn root(sink: EventSink, workflow_id: &str, execution_id: &str) -> Self {
        Self {
            sink,
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            depth: 0,
            path: Vec::new(),
            parent_execution_id: None,
        }
    }

    /// Scope for a sub-workflow invoked from `node_id`.
    pub fn child(&self, workflow_id: &str, sub_execution_id: &str, node_id: &str) -> Self {
        let mut path = self.path.clone();
        path.push(node_id.to_string());
        Self {
            sink: self.sink.clone(),
            workflow_id: workflow_id.to_string(),
            execution_id: sub_execution_id.to_string(),
            depth: self.depth + 1,
            path,
            parent_execution_id: Some(self.execution_id.clone()),
        }
    }

    /// The streaming envelope exposed to executors.
    pub fn streaming_context(&self) -> StreamingContext {
        StreamingContext {
            execution_id: self.execution_id.clone(),
            depth: self.depth,
            parent_execution_id: self.parent_execution_id.clone(),
            path: self.path.clone(),
        }
    }

    pub fn emit(&self, kind: EventKind, data: Value, metadata: Option<Value>) {
        self.sink.emit(StreamEvent {
            kind,
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
            depth: self.depth,
            path: self.path.clone(),
            parent_execution_id: self.parent_execution_id.clone(),
            data,
            metadata,
        });
    }
}

/// Encode one event as a server-sent-events frame.
pub fn sse_frame(event: &StreamEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}
