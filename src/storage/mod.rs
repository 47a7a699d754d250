//! Persistence: the execution journal and the definition store.
//!
//! The journal records execution and node-execution lifecycles. It is a
//! trait so the engine can run against the durable SQLite backing or a
//! per-request in-memory backing (dry-run mode) without knowing which.

mod memory;
mod models;
mod sqlite;

pub use memory::MemoryJournal;
pub use models::{
    ConfigRecord, CustomExecutorRecord, Execution, ExecutionStatus, NodeExecution, StoredWorkflow,
};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::Result;

/// Persistence of execution and node-execution records.
///
/// Writes per record id are atomic: a reader never observes a partially
/// updated record.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn create_execution(&self, execution: &Execution) -> Result<()>;
    async fn update_execution(&self, execution: &Execution) -> Result<()>;
    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;
    async fn list_executions(
        &self,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Execution>>;

    async fn create_node_execution(&self, node_execution: &NodeExecution) -> Result<()>;
    async fn update_node_execution(&self, node_execution: &NodeExecution) -> Result<()>;
    async fn list_node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecution>>;
}

/// Read access to stored workflow definitions, configs, and custom
/// executor records, consumed by the engine during traversal.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get_workflow(&self, id: &str) -> Result<Option<StoredWorkflow>>;
    async fn get_config(&self, id: &str) -> Result<Option<ConfigRecord>>;
    async fn get_custom_executor(&self, type_name: &str) -> Result<Option<CustomExecutorRecord>>;
}
