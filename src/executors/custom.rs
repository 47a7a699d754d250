//! Custom executors: stored workflows wrapped behind the executor trait.
//!
//! A custom executor record names a source workflow; resolution loads the
//! definition once and the wrapper runs it as a nested execution whenever
//! the executor is invoked. The expanded node config becomes the wrapped
//! workflow's parameters.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::types::{ChunkFn, Executor, ExecutorInput};
use crate::error::{Error, Result};
use crate::storage::CustomExecutorRecord;
use crate::workflow::Workflow;

pub struct WorkflowBackedExecutor {
    record: CustomExecutorRecord,
    workflow: Workflow,
}

impl WorkflowBackedExecutor {
    pub fn new(record: CustomExecutorRecord, workflow: Workflow) -> Self {
        Self { record, workflow }
    }

    pub fn source_workflow_id(&self) -> &str {
        &self.record.source_workflow_id
    }
}

#[async_trait]
impl Executor for WorkflowBackedExecutor {
    fn type_name(&self) -> &str {
        &self.record.type_name
    }

    fn description(&self) -> &str {
        "Custom executor backed by a stored workflow"
    }

    fn config_schema(&self) -> Option<Value> {
        self.record.config_schema.clone()
    }

    async fn run(
        &self,
        config: &Value,
        input: &ExecutorInput,
        _on_chunk: Option<ChunkFn>,
    ) -> Result<Value> {
        let engine = input.engine.as_ref().ok_or_else(|| {
            Error::Executor(format!(
                "custom executor '{}' requires an engine handle",
                self.record.type_name
            ))
        })?;

        info!(
            "Custom executor '{}' invoking workflow '{}'",
            self.record.type_name, self.workflow.id
        );

        engine
            .invoke_workflow(&self.workflow, config.clone(), input.config.clone())
            .await
            .map_err(|e| {
                Error::Executor(format!(
                    "custom executor '{}' failed: {}",
                    self.record.type_name, e
                ))
            })
    }
}
