//! Script executor - data transformation using Rhai expressions.
//!
//! The execution context roots (`parameters`, `config`, `state`, `parent`)
//! are pushed into the Rhai scope as native maps, so scripts index them
//! directly: `state.count + parent.fetch.total`.

use async_trait::async_trait;
use rhai::{Engine, Scope};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::{Error, Result};

pub struct ScriptExecutor;

impl ScriptExecutor {
    pub fn new() -> Self {
        Self
    }

    fn create_engine() -> Engine {
        let mut engine = Engine::new();

        engine.register_fn("to_json", |v: rhai::Dynamic| -> String {
            serde_json::to_string(&dynamic_to_json(v)).unwrap_or_default()
        });
        engine.register_fn("from_json", |s: &str| -> rhai::Dynamic {
            serde_json::from_str::<Value>(s)
                .map(json_to_dynamic)
                .unwrap_or(rhai::Dynamic::UNIT)
        });

        engine
    }
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ScriptConfig {
    /// Rhai expression to evaluate.
    expression: String,
}

#[async_trait]
impl Executor for ScriptExecutor {
    fn type_name(&self) -> &str {
        "script"
    }

    fn description(&self) -> &str {
        "Transform data with a Rhai expression over the execution context"
    }

    fn config_schema(&self) -> Option<Value> {
        Some(serde_json::json!({
            "type": "object",
            "required": ["expression"],
            "properties": {"expression": {"type": "string"}}
        }))
    }

    async fn run(
        &self,
        config: &Value,
        input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        let config: ScriptConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::Executor(format!("Invalid script config: {}", e)))?;

        debug!("Script: {}", config.expression);

        let engine = Self::create_engine();
        let mut scope = Scope::new();
        scope.push_dynamic("parameters", json_to_dynamic(input.parameters.clone()));
        scope.push_dynamic("config", json_to_dynamic(input.config.clone()));
        scope.push_dynamic("state", json_to_dynamic(input.state.clone()));
        scope.push_dynamic("parent", json_to_dynamic(input.parent.clone()));

        let result: rhai::Dynamic = engine
            .eval_with_scope(&mut scope, &config.expression)
            .map_err(|e| Error::Executor(format!("Script error: {}", e)))?;

        Ok(dynamic_to_json(result))
    }
}

fn dynamic_to_json(v: rhai::Dynamic) -> Value {
    if v.is_unit() {
        Value::Null
    } else if v.is_bool() {
        Value::Bool(v.as_bool().unwrap_or(false))
    } else if v.is_int() {
        serde_json::json!(v.as_int().unwrap_or(0))
    } else if v.is_float() {
        serde_json::json!(v.as_float().unwrap_or(0.0))
    } else if v.is_string() {
        Value::String(v.into_string().unwrap_or_default())
    } else if v.is_array() {
        match v.into_array() {
            Ok(arr) => Value::Array(arr.into_iter().map(dynamic_to_json).collect()),
            Err(_) => Value::Null,
        }
    } else if v.is_map() {
        match v.try_cast::<rhai::Map>() {
            Some(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                    .collect(),
            ),
            None => Value::Null,
        }
    } else {
        Value::String(v.to_string())
    }
}

fn json_to_dynamic(value: Value) -> rhai::Dynamic {
    match value {
        Value::Null => rhai::Dynamic::UNIT,
        Value::Bool(b) => rhai::Dynamic::from(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rhai::Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                rhai::Dynamic::from(f)
            } else {
                rhai::Dynamic::UNIT
            }
        }
        Value::String(s) => rhai::Dynamic::from(s),
        Value::Array(arr) => {
            let items: Vec<rhai::Dynamic> = arr.into_iter().map(json_to_dynamic).collect();
            rhai::Dynamic::from(items)
        }
        Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.into(), json_to_dynamic(v));
            }
            rhai::Dynamic::from(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> ExecutorInput {
        ExecutorInput::new(
            json!({"n": 4}),
            json!({}),
            json!({"count": 2}),
            json!({"fetch": {"total": 10}}),
        )
    }

    #[tokio::test]
    async fn test_script_math() {
        let executor = ScriptExecutor::new();
        let out = executor
            .run(&json!({"expression": "2 + 2"}), &input(), None)
            .await
            .unwrap();
        assert_eq!(out, json!(4));
    }

    #[tokio::test]
    async fn test_script_reads_context_roots() {
        let executor = ScriptExecutor::new();
        let out = executor
            .run(
                &json!({"expression": "state.count + parent.fetch.total + parameters.n"}),
                &input(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, json!(16));
    }

    #[tokio::test]
    async fn test_script_builds_objects() {
        let executor = ScriptExecutor::new();
        let out = executor
            .run(
                &json!({"expression": "#{\"doubled\": state.count * 2}"}),
                &input(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"doubled": 4}));
    }

    #[tokio::test]
    async fn test_script_invalid_expression() {
        let executor = ScriptExecutor::new();
        let err = executor
            .run(&json!({"expression": "1 +"}), &input(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Script error"));
    }

    #[tokio::test]
    async fn test_script_missing_expression() {
        let executor = ScriptExecutor::new();
        let err = executor.run(&json!({}), &input(), None).await.unwrap_err();
        assert!(err.to_string().contains("Invalid script config"));
    }
}
