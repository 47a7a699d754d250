//! Executor registry - resolves node types to runnable executors.
//!
//! Built-ins are searched first, then stored custom executors. Resolved
//! custom executors are cached per type; the reserved `workflow_executor`
//! type is handled by the orchestrator and never reaches the registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::custom::WorkflowBackedExecutor;
use super::types::Executor;
use super::{
    DebugExecutor, HttpExecutor, PassthroughExecutor, ScriptExecutor, TransformExecutor,
    WaitExecutor,
};
use crate::error::{Error, Result};
use crate::storage::DefinitionStore;
use crate::workflow::parse_workflow;

/// Registry of available executor types.
pub struct ExecutorRegistry {
    builtins: HashMap<String, Arc<dyn Executor>>,
    custom_cache: Mutex<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    /// Create a registry with the default built-in executors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TransformExecutor::new()));
        registry.register(Arc::new(PassthroughExecutor::new()));
        registry.register(Arc::new(ScriptExecutor::new()));
        registry.register(Arc::new(HttpExecutor::new()));
        registry.register(Arc::new(WaitExecutor::new()));
        registry.register(Arc::new(DebugExecutor::new()));
        registry
    }

    /// Create an empty registry (for testing).
    pub fn empty() -> Self {
        Self {
            builtins: HashMap::new(),
            custom_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a built-in executor.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.builtins
            .insert(executor.type_name().to_string(), executor);
    }

    /// Check whether a built-in with this type exists.
    pub fn has_builtin(&self, type_name: &str) -> bool {
        self.builtins.contains_key(type_name)
    }

    /// List registered built-in types.
    pub fn builtin_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builtins.keys().map(|s| s.as_str()).collect();
        types.sort();
        types
    }

    /// Resolve a node type to an executor.
    ///
    /// Built-ins win; otherwise the definition store is consulted for a
    /// custom executor record, whose source workflow is loaded and cached.
    pub async fn resolve(
        &self,
        type_name: &str,
        definitions: &Arc<dyn DefinitionStore>,
    ) -> Result<Arc<dyn Executor>> {
        if let Some(executor) = self.builtins.get(type_name) {
            return Ok(executor.clone());
        }

        {
            let cache = self.custom_cache.lock().await;
            if let Some(executor) = cache.get(type_name) {
                return Ok(executor.clone());
            }
        }

        let record = definitions
            .get_custom_executor(type_name)
            .await?
            .ok_or_else(|| {
                Error::Executor(format!(
                    "executor not found for node type: {}",
                    type_name
                ))
            })?;

        let stored = definitions
            .get_workflow(&record.source_workflow_id)
            .await?
            .ok_or_else(|| {
                Error::Executor(format!(
                    "custom executor '{}' references missing workflow '{}'",
                    type_name, record.source_workflow_id
                ))
            })?;
        let workflow = parse_workflow(&stored.definition)?;

        let executor: Arc<dyn Executor> = Arc::new(WorkflowBackedExecutor::new(record, workflow));
        self.custom_cache
            .lock()
            .await
            .insert(type_name.to_string(), executor.clone());

        Ok(executor)
    }

    /// Evict one cached custom executor, or all of them.
    pub async fn clear_cache(&self, type_name: Option<&str>) {
        let mut cache = self.custom_cache.lock().await;
        match type_name {
            Some(type_name) => {
                cache.remove(type_name);
            }
            None => cache.clear(),
        }
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CustomExecutorRecord, SqliteStorage, StoredWorkflow};
    use chrono::Utc;

    #[test]
    fn test_registry_default_builtins() {
        let registry = ExecutorRegistry::new();
        for type_name in ["transform", "passthrough", "script", "http", "wait", "debug"] {
            assert!(registry.has_builtin(type_name), "missing {}", type_name);
        }
        assert!(!registry.has_builtin("workflow_executor"));
        assert!(!registry.has_builtin("nonexistent"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_type() {
        let registry = ExecutorRegistry::new();
        let storage = SqliteStorage::open_in_memory().unwrap();
        let definitions: Arc<dyn DefinitionStore> = Arc::new(storage);

        let err = registry.resolve("mystery", &definitions).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "executor not found for node type: mystery"
        );
    }

    #[tokio::test]
    async fn test_resolve_custom_executor_and_cache() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();
        let definition = serde_json::json!({
            "id": "wf-upper",
            "name": "upper",
            "nodes": [{"id": "only", "type": "transform", "config": {"value": 1}}],
            "startNode": "only",
            "endNode": "only"
        })
        .to_string();

        storage
            .save_workflow(&StoredWorkflow {
                id: "wf-upper".to_string(),
                name: "upper".to_string(),
                definition,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        storage
            .save_custom_executor(&CustomExecutorRecord {
                type_name: "upper".to_string(),
                source_workflow_id: "wf-upper".to_string(),
                config_schema: None,
                created_at: now,
            })
            .await
            .unwrap();

        let registry = ExecutorRegistry::new();
        let definitions: Arc<dyn DefinitionStore> = Arc::new(storage.clone());

        let resolved = registry.resolve("upper", &definitions).await.unwrap();
        assert_eq!(resolved.type_name(), "upper");

        // Second resolution is served from cache even if the record vanishes.
        storage.delete_custom_executor("upper").await.unwrap();
        assert!(registry.resolve("upper", &definitions).await.is_ok());

        registry.clear_cache(Some("upper")).await;
        assert!(registry.resolve("upper", &definitions).await.is_err());
    }

    #[tokio::test]
    async fn test_builtin_shadows_custom() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let registry = ExecutorRegistry::new();
        let definitions: Arc<dyn DefinitionStore> = Arc::new(storage);

        let resolved = registry.resolve("transform", &definitions).await.unwrap();
        assert_eq!(resolved.type_name(), "transform");
    }
}
