//! Wait executor - pauses the traversal for a configured duration.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::{Error, Result};

/// Upper bound so a template mistake cannot stall an execution for hours.
const MAX_WAIT_MS: u64 = 300_000;

pub struct WaitExecutor;

impl WaitExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WaitExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WaitConfig {
    duration_ms: u64,
}

#[async_trait]
impl Executor for WaitExecutor {
    fn type_name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Sleep for duration_ms milliseconds"
    }

    fn config_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["duration_ms"],
            "properties": {"duration_ms": {"type": "integer", "minimum": 0}}
        }))
    }

    async fn run(
        &self,
        config: &Value,
        _input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        let config: WaitConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Executor(format!("Invalid wait config: {}", e)))?;

        if config.duration_ms > MAX_WAIT_MS {
            return Err(Error::Executor(format!(
                "wait duration {}ms exceeds the maximum of {}ms",
                config.duration_ms, MAX_WAIT_MS
            )));
        }

        tokio::time::sleep(Duration::from_millis(config.duration_ms)).await;
        Ok(json!({"waited_ms": config.duration_ms}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_duration() {
        let executor = WaitExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let out = executor
            .run(&json!({"duration_ms": 1}), &input, None)
            .await
            .unwrap();
        assert_eq!(out, json!({"waited_ms": 1}));
    }

    #[tokio::test]
    async fn test_wait_rejects_excessive_duration() {
        let executor = WaitExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let err = executor
            .run(&json!({"duration_ms": 600_000}), &input, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));
    }
}
