//! In-memory execution journal.
//!
//! Backs dry-run executions: records live for the duration of one request
//! and are discarded with the journal. The engine drives it through the
//! same `Journal` trait as the durable backing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::models::{Execution, NodeExecution};
use super::Journal;
use crate::error::Result;

#[derive(Default)]
struct Records {
    executions: HashMap<String, Execution>,
    // Insertion-ordered so listing reflects traversal order.
    node_executions: Vec<NodeExecution>,
}

/// Journal that keeps all records in process memory.
#[derive(Clone, Default)]
pub struct MemoryJournal {
    records: Arc<Mutex<Records>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        let mut records = self.records.lock().await;
        records
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let mut records = self.records.lock().await;
        records
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let records = self.records.lock().await;
        Ok(records.executions.get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Execution>> {
        let records = self.records.lock().await;
        let mut executions: Vec<Execution> = records
            .executions
            .values()
            .filter(|e| workflow_id.map(|id| e.workflow_id == id).unwrap_or(true))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        executions.truncate(limit);
        Ok(executions)
    }

    async fn create_node_execution(&self, node_execution: &NodeExecution) -> Result<()> {
        let mut records = self.records.lock().await;
        records.node_executions.push(node_execution.clone());
        Ok(())
    }

    async fn update_node_execution(&self, node_execution: &NodeExecution) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records
            .node_executions
            .iter_mut()
            .find(|n| n.id == node_execution.id)
        {
            *existing = node_execution.clone();
        }
        Ok(())
    }

    async fn list_node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecution>> {
        let records = self.records.lock().await;
        Ok(records
            .node_executions
            .iter()
            .filter(|n| n.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ExecutionStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_execution_lifecycle() {
        let journal = MemoryJournal::new();
        let mut execution = Execution::pending("w1", json!({}), json!({}), None);

        journal.create_execution(&execution).await.unwrap();
        execution.status = ExecutionStatus::Running;
        journal.update_execution(&execution).await.unwrap();

        let loaded = journal.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_memory_node_executions_keep_insertion_order() {
        let journal = MemoryJournal::new();
        let execution = Execution::pending("w1", json!({}), json!({}), None);
        journal.create_execution(&execution).await.unwrap();

        for node_id in ["x", "y", "x"] {
            journal
                .create_node_execution(&NodeExecution::running(&execution.id, node_id))
                .await
                .unwrap();
        }

        let nodes = journal.list_node_executions(&execution.id).await.unwrap();
        let order: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(order, vec!["x", "y", "x"]);
    }

    #[tokio::test]
    async fn test_memory_journals_are_isolated() {
        let first = MemoryJournal::new();
        let second = MemoryJournal::new();
        let execution = Execution::pending("w1", json!({}), json!({}), None);

        first.create_execution(&execution).await.unwrap();
        assert!(second.get_execution(&execution.id).await.unwrap().is_none());
    }
}
