//! SQLite storage implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tokio::sync::Mutex;

use super::models::*;
use super::{DefinitionStore, Journal};
use crate::error::{Error, Result};

/// SQLite-backed storage for definitions and the durable journal.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS configs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                variables TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS custom_executors (
                type TEXT PRIMARY KEY,
                source_workflow_id TEXT NOT NULL,
                config_schema TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (source_workflow_id) REFERENCES workflows(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                parameters TEXT NOT NULL,
                config TEXT NOT NULL,
                config_id TEXT,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS node_executions (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (execution_id) REFERENCES executions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_node_executions_execution
                ON node_executions(execution_id);
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Workflow operations
    // ========================================================================

    pub async fn save_workflow(&self, workflow: &StoredWorkflow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO workflows (id, name, definition, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                definition = excluded.definition,
                updated_at = excluded.updated_at",
            params![
                workflow.id,
                workflow.name,
                workflow.definition,
                workflow.created_at.to_rfc3339(),
                workflow.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_workflows(&self) -> Result<Vec<StoredWorkflow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, definition, created_at, updated_at
             FROM workflows ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_workflow)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute("DELETE FROM workflows WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    // ========================================================================
    // Config operations
    // ========================================================================

    pub async fn save_config(&self, config: &ConfigRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO configs (id, name, variables, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                variables = excluded.variables,
                updated_at = excluded.updated_at",
            params![
                config.id,
                config.name,
                serde_json::to_string(&config.variables)?,
                config.created_at.to_rfc3339(),
                config.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_configs(&self) -> Result<Vec<ConfigRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, variables, created_at, updated_at FROM configs ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_config)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    // ========================================================================
    // Custom executor operations
    // ========================================================================

    pub async fn save_custom_executor(&self, record: &CustomExecutorRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO custom_executors (type, source_workflow_id, config_schema, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(type) DO UPDATE SET
                source_workflow_id = excluded.source_workflow_id,
                config_schema = excluded.config_schema",
            params![
                record.type_name,
                record.source_workflow_id,
                record
                    .config_schema
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_custom_executors(&self) -> Result<Vec<CustomExecutorRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT type, source_workflow_id, config_schema, created_at
             FROM custom_executors ORDER BY type",
        )?;
        let rows = stmt.query_map([], row_to_custom_executor)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }

    pub async fn delete_custom_executor(&self, type_name: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute("DELETE FROM custom_executors WHERE type = ?1", [type_name])?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl DefinitionStore for SqliteStorage {
    async fn get_workflow(&self, id: &str) -> Result<Option<StoredWorkflow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, definition, created_at, updated_at FROM workflows WHERE id = ?1",
        )?;
        stmt.query_row([id], row_to_workflow)
            .optional()
            .map_err(Error::from)
    }

    async fn get_config(&self, id: &str) -> Result<Option<ConfigRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, variables, created_at, updated_at FROM configs WHERE id = ?1",
        )?;
        stmt.query_row([id], row_to_config)
            .optional()
            .map_err(Error::from)
    }

    async fn get_custom_executor(&self, type_name: &str) -> Result<Option<CustomExecutorRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT type, source_workflow_id, config_schema, created_at
             FROM custom_executors WHERE type = ?1",
        )?;
        stmt.query_row([type_name], row_to_custom_executor)
            .optional()
            .map_err(Error::from)
    }
}

#[async_trait]
impl Journal for SqliteStorage {
    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO executions
                (id, workflow_id, status, parameters, config, config_id, result, error,
                 created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                execution.id,
                execution.workflow_id,
                execution.status.to_string(),
                serde_json::to_string(&execution.parameters)?,
                serde_json::to_string(&execution.config)?,
                execution.config_id,
                execution
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                execution.error,
                execution.created_at.to_rfc3339(),
                execution.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE executions
             SET status = ?2, result = ?3, error = ?4, completed_at = ?5
             WHERE id = ?1",
            params![
                execution.id,
                execution.status.to_string(),
                execution
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                execution.error,
                execution.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, workflow_id, status, parameters, config, config_id, result, error,
                    created_at, completed_at
             FROM executions WHERE id = ?1",
        )?;
        stmt.query_row([id], row_to_execution)
            .optional()
            .map_err(Error::from)
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Execution>> {
        let conn = self.conn.lock().await;
        let rows = match workflow_id {
            Some(workflow_id) => {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, status, parameters, config, config_id, result,
                            error, created_at, completed_at
                     FROM executions WHERE workflow_id = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![workflow_id, limit as i64], row_to_execution)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, status, parameters, config, config_id, result,
                            error, created_at, completed_at
                     FROM executions ORDER BY created_at DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], row_to_execution)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    async fn create_node_execution(&self, node_execution: &NodeExecution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO node_executions
                (id, execution_id, node_id, status, output, error, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                node_execution.id,
                node_execution.execution_id,
                node_execution.node_id,
                node_execution.status.to_string(),
                node_execution
                    .output
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                node_execution.error,
                node_execution.created_at.to_rfc3339(),
                node_execution.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn update_node_execution(&self, node_execution: &NodeExecution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE node_executions
             SET status = ?2, output = ?3, error = ?4, completed_at = ?5
             WHERE id = ?1",
            params![
                node_execution.id,
                node_execution.status.to_string(),
                node_execution
                    .output
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                node_execution.error,
                node_execution.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn list_node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecution>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, execution_id, node_id, status, output, error, created_at, completed_at
             FROM node_executions WHERE execution_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([execution_id], row_to_node_execution)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::from)
    }
}

// ============================================================================
// Row mapping helpers
// ============================================================================

fn parse_timestamp(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json(raw: String) -> rusqlite::Result<Value> {
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_status(raw: String) -> rusqlite::Result<ExecutionStatus> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<StoredWorkflow> {
    Ok(StoredWorkflow {
        id: row.get(0)?,
        name: row.get(1)?,
        definition: row.get(2)?,
        created_at: parse_timestamp(row.get(3)?)?,
        updated_at: parse_timestamp(row.get(4)?)?,
    })
}

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<ConfigRecord> {
    let variables = match parse_json(row.get(2)?)? {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    Ok(ConfigRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        variables,
        created_at: parse_timestamp(row.get(3)?)?,
        updated_at: parse_timestamp(row.get(4)?)?,
    })
}

fn row_to_custom_executor(row: &Row<'_>) -> rusqlite::Result<CustomExecutorRecord> {
    let config_schema: Option<String> = row.get(2)?;
    Ok(CustomExecutorRecord {
        type_name: row.get(0)?,
        source_workflow_id: row.get(1)?,
        config_schema: config_schema.map(parse_json).transpose()?,
        created_at: parse_timestamp(row.get(3)?)?,
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<Execution> {
    let result: Option<String> = row.get(6)?;
    let completed_at: Option<String> = row.get(9)?;
    Ok(Execution {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        status: parse_status(row.get(2)?)?,
        parameters: parse_json(row.get(3)?)?,
        config: parse_json(row.get(4)?)?,
        config_id: row.get(5)?,
        result: result.map(parse_json).transpose()?,
        error: row.get(7)?,
        created_at: parse_timestamp(row.get(8)?)?,
        completed_at: completed_at.map(parse_timestamp).transpose()?,
    })
}

fn row_to_node_execution(row: &Row<'_>) -> rusqlite::Result<NodeExecution> {
    let output: Option<String> = row.get(4)?;
    let completed_at: Option<String> = row.get(7)?;
    Ok(NodeExecution {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        node_id: row.get(2)?,
        status: parse_status(row.get(3)?)?,
        output: output.map(parse_json).transpose()?,
        error: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?)?,
        completed_at: completed_at.map(parse_timestamp).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow_record(id: &str) -> StoredWorkflow {
        let now = Utc::now();
        StoredWorkflow {
            id: id.to_string(),
            name: format!("wf-{}", id),
            definition: "{}".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.db");

        let storage = SqliteStorage::open(&path).unwrap();
        storage.save_workflow(&workflow_record("w1")).await.unwrap();
        drop(storage);

        // Reopening sees the persisted record.
        let reopened = SqliteStorage::open(&path).unwrap();
        assert!(reopened.get_workflow("w1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_workflow_round_trip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.save_workflow(&workflow_record("w1")).await.unwrap();

        let loaded = storage.get_workflow("w1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "wf-w1");
        assert!(storage.get_workflow("missing").await.unwrap().is_none());

        assert_eq!(storage.list_workflows().await.unwrap().len(), 1);
        assert!(storage.delete_workflow("w1").await.unwrap());
        assert!(!storage.delete_workflow("w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();
        let mut variables = serde_json::Map::new();
        variables.insert("api_url".to_string(), json!("https://api.test"));

        storage
            .save_config(&ConfigRecord {
                id: "c1".to_string(),
                name: "prod".to_string(),
                variables,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let loaded = storage.get_config("c1").await.unwrap().unwrap();
        assert_eq!(loaded.variables["api_url"], json!("https://api.test"));
    }

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut execution = Execution::pending("w1", json!({"n": 1}), json!({}), None);

        storage.create_execution(&execution).await.unwrap();

        execution.status = ExecutionStatus::Completed;
        execution.result = Some(json!({"v": 3}));
        execution.completed_at = Some(Utc::now());
        storage.update_execution(&execution).await.unwrap();

        let loaded = storage.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.result, Some(json!({"v": 3})));
        assert_eq!(loaded.parameters, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_node_executions_preserve_order() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let execution = Execution::pending("w1", json!({}), json!({}), None);
        storage.create_execution(&execution).await.unwrap();

        for node_id in ["a", "b", "a"] {
            let mut ne = NodeExecution::running(&execution.id, node_id);
            storage.create_node_execution(&ne).await.unwrap();
            ne.status = ExecutionStatus::Completed;
            ne.completed_at = Some(Utc::now());
            storage.update_node_execution(&ne).await.unwrap();
        }

        let nodes = storage.list_node_executions(&execution.id).await.unwrap();
        let order: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_custom_executor_round_trip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.save_workflow(&workflow_record("w1")).await.unwrap();

        storage
            .save_custom_executor(&CustomExecutorRecord {
                type_name: "sentiment".to_string(),
                source_workflow_id: "w1".to_string(),
                config_schema: Some(json!({"type": "object"})),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let loaded = storage
            .get_custom_executor("sentiment")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.source_workflow_id, "w1");
        assert!(storage.delete_custom_executor("sentiment").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_executions_filter() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        for workflow_id in ["w1", "w1", "w2"] {
            let execution = Execution::pending(workflow_id, json!({}), json!({}), None);
            storage.create_execution(&execution).await.unwrap();
        }

        assert_eq!(storage.list_executions(None, 10).await.unwrap().len(), 3);
        assert_eq!(
            storage.list_executions(Some("w1"), 10).await.unwrap().len(),
            2
        );
    }
}
