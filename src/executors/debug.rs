//! Debug executor - logs its config and echoes it back.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::Result;

pub struct DebugExecutor;

impl DebugExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DebugExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for DebugExecutor {
    fn type_name(&self) -> &str {
        "debug"
    }

    fn description(&self) -> &str {
        "Log the expanded config and pass it through"
    }

    async fn run(
        &self,
        config: &Value,
        input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        let label = config
            .get("label")
            .and_then(|l| l.as_str())
            .unwrap_or("debug");
        info!(state = %input.state, "[{}] {}", label, config);
        Ok(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_debug_echoes_config() {
        let executor = DebugExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let config = json!({"label": "here", "payload": [1, 2]});
        let out = executor.run(&config, &input, None).await.unwrap();
        assert_eq!(out, config);
    }
}
