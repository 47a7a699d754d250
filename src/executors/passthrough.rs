//! Passthrough executor - forwards context without transformation.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::Result;

pub struct PassthroughExecutor;

impl PassthroughExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PassthroughExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for PassthroughExecutor {
    fn type_name(&self) -> &str {
        "passthrough"
    }

    fn description(&self) -> &str {
        "Echo the expanded config, or a context snapshot when config is empty"
    }

    async fn run(
        &self,
        config: &Value,
        input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        if !config.is_null() && config.as_object().map(|m| !m.is_empty()).unwrap_or(true) {
            return Ok(config.clone());
        }
        Ok(json!({
            "parameters": input.parameters,
            "state": input.state,
            "parent": input.parent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_echoes_config() {
        let executor = PassthroughExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let out = executor.run(&json!({"x": 1}), &input, None).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_passthrough_snapshots_context_when_config_empty() {
        let executor = PassthroughExecutor::new();
        let input = ExecutorInput::new(
            json!({"p": 1}),
            json!({}),
            json!({"count": 2}),
            json!({"a": {"v": 3}}),
        );

        let out = executor.run(&Value::Null, &input, None).await.unwrap();
        assert_eq!(out["parameters"], json!({"p": 1}));
        assert_eq!(out["state"], json!({"count": 2}));
        assert_eq!(out["parent"], json!({"a": {"v": 3}}));

        let out = executor.run(&json!({}), &input, None).await.unwrap();
        assert_eq!(out["state"], json!({"count": 2}));
    }
}
