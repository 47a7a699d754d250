//! Executor trait and invocation types.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::{Orchestrator, StreamingContext};
use crate::error::Result;

/// Callback delivering one streamed chunk from an executor.
pub type ChunkFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Context handed to an executor for one node invocation.
///
/// `config` here is the execution's resolved config snapshot; the node's
/// own (template-expanded) config arrives as the first argument of `run`.
#[derive(Clone)]
pub struct ExecutorInput {
    pub parameters: Value,
    pub config: Value,
    pub state: Value,
    /// Prior node outputs keyed by node id.
    pub parent: Value,
    /// Streaming envelope, present when the execution streams.
    pub context: Option<StreamingContext>,
    /// Engine handle for executors that invoke nested workflows.
    pub engine: Option<Orchestrator>,
}

impl ExecutorInput {
    pub fn new(parameters: Value, config: Value, state: Value, parent: Value) -> Self {
        Self {
            parameters,
            config,
            state,
            parent,
            context: None,
            engine: None,
        }
    }
}

/// Trait implemented by every node executor.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Unique executor type string (e.g. "transform", "http").
    fn type_name(&self) -> &str;

    /// Human description shown in listings.
    fn description(&self) -> &str {
        "A workflow executor"
    }

    /// Structural validation schema for node configs, when one exists.
    fn config_schema(&self) -> Option<Value> {
        None
    }

    /// Whether this executor can deliver incremental chunks.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Execute the node.
    ///
    /// `config` is the node's config after template expansion; `on_chunk`
    /// is present when the orchestrator wants incremental output.
    async fn run(
        &self,
        config: &Value,
        input: &ExecutorInput,
        on_chunk: Option<ChunkFn>,
    ) -> Result<Value>;
}

impl std::fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("type_name", &self.type_name()).finish()
    }
}
