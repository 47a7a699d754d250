//! Transform executor - returns its expanded config as output.
//!
//! The orchestrator has already run the config through the template
//! evaluator, so by the time `run` is called the tree holds concrete
//! values. With a `chunks` array and a streaming invocation, the elements
//! are delivered incrementally before the result is returned.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::Result;

pub struct TransformExecutor;

impl TransformExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TransformExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for TransformExecutor {
    fn type_name(&self) -> &str {
        "transform"
    }

    fn description(&self) -> &str {
        "Produce the node's expanded config as output"
    }

    fn config_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "value": {},
                "chunks": {"type": "array"}
            }
        }))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn run(
        &self,
        config: &Value,
        _input: &ExecutorInput,
        on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        if let Some(chunks) = config.get("chunks").and_then(|c| c.as_array()) {
            if let Some(on_chunk) = &on_chunk {
                for chunk in chunks {
                    on_chunk(chunk.clone());
                }
            }
            if let Some(value) = config.get("value") {
                return Ok(value.clone());
            }
            return Ok(Value::Array(chunks.clone()));
        }

        match config.get("value") {
            Some(value) => Ok(value.clone()),
            None => Ok(config.clone()),
        }
    }
}
