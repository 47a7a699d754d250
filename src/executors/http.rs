//! HTTP executor - performs a request described by the node config.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::{Error, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

#[async_trait]
impl Executor for HttpExecutor {
    fn type_name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Perform an HTTP request and return {status, body}"
    }

    fn config_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["url"],
            "properties": {
                "url": {"type": "string"},
                "method": {"type": "string"},
                "headers": {"type": "object"},
                "body": {},
                "timeout_seconds": {"type": "integer", "minimum": 1}
            }
        }))
    }

    async fn run(
        &self,
        config: &Value,
        _input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        let config: HttpConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Executor(format!("Invalid http config: {}", e)))?;

        let method: reqwest::Method = config
            .method
            .to_uppercase()
            .parse()
            .map_err(|_| Error::Executor(format!("Invalid HTTP method: {}", config.method)))?;

        debug!("HTTP {} {}", method, config.url);

        let mut request = self
            .client
            .request(method, &config.url)
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)));

        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            request = match body {
                Value::String(s) => request.body(s.clone()),
                other => request.json(other),
            };
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        // JSON bodies come back structured, anything else as text.
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(json!({"status": status, "body": body}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_invalid_config() {
        let executor = HttpExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let err = executor.run(&json!({}), &input, None).await.unwrap_err();
        assert!(err.to_string().contains("Invalid http config"));
    }

    #[tokio::test]
    async fn test_http_invalid_method() {
        let executor = HttpExecutor::new();
        let input = ExecutorInput::new(json!({}), json!({}), json!({}), json!({}));
        let err = executor
            .run(
                &json!({"url": "http://localhost:1", "method": "NOT A METHOD"}),
                &input,
                None,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid HTTP method"));
    }
}
