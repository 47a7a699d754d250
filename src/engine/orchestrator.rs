//! Workflow orchestrator: graph traversal from start node to end node.
//!
//! The orchestrator is the only component that mutates execution state,
//! node-execution records, and the live context. Traversal follows ids
//! through lookup maps, never node references, so cyclic workflows revisit
//! nodes freely; `maxIterations` is the bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, Span};

use super::cancel::CancelRegistry;
use super::stream::{EventKind, EventSink, StreamScope};
use crate::error::{Error, Result};
use crate::executors::{ChunkFn, ExecutorInput, ExecutorRegistry, WORKFLOW_EXECUTOR_TYPE};
use crate::storage::{DefinitionStore, Execution, ExecutionStatus, Journal, NodeExecution};
use crate::template::{self, Context};
use crate::validation::{validate_executor_config, validate_parameters};
use crate::workflow::{parse_workflow, validate_workflow, Edge, Node, Workflow};

/// Drives one execution of a workflow.
///
/// Cloning is cheap: all backing components are shared handles. Attach an
/// `EventSink` with [`with_stream`](Self::with_stream) to receive the live
/// event stream for the executions this instance drives.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ExecutorRegistry>,
    definitions: Arc<dyn DefinitionStore>,
    journal: Arc<dyn Journal>,
    cancellations: CancelRegistry,
    sink: Option<EventSink>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        definitions: Arc<dyn DefinitionStore>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            registry,
            definitions,
            journal,
            cancellations: CancelRegistry::new(),
            sink: None,
        }
    }

    /// Attach a live event sink for streamed executions.
    pub fn with_stream(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share a cancellation registry (usually the server-wide one).
    pub fn with_cancellations(mut self, cancellations: CancelRegistry) -> Self {
        self.cancellations = cancellations;
        self
    }

    /// Handle passed to executors that invoke nested workflows; nested
    /// invocations through it do not inherit this execution's stream.
    fn handle(&self) -> Orchestrator {
        let mut handle = self.clone();
        handle.sink = None;
        handle
    }

    /// Execute a workflow and return the terminal execution record.
    ///
    /// Traversal failures are captured on the record (`status = failed`);
    /// an `Err` return means the engine itself could not make progress
    /// (journal unavailable, unresolvable config, invalid parameters).
    #[instrument(
        name = "workflow.execute",
        skip(self, workflow, parameters),
        fields(workflow_id = %workflow.id, execution_id = tracing::field::Empty)
    )]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        parameters: Value,
        config_id: Option<String>,
    ) -> Result<Execution> {
        validate_parameters(workflow.parameters.as_ref(), &parameters)?;

        let config_id = config_id.or_else(|| workflow.config_id.clone());
        let config = match &config_id {
            Some(id) => {
                let record = self
                    .definitions
                    .get_config(id)
                    .await?
                    .ok_or_else(|| Error::Config(format!("Config '{}' not found", id)))?;
                Value::Object(record.variables)
            }
            None => Value::Object(Map::new()),
        };

        let mut execution =
            Execution::pending(&workflow.id, parameters.clone(), config.clone(), config_id);
        Span::current().record("execution_id", execution.id.as_str());
        self.journal.create_execution(&execution).await?;

        info!(
            "Starting execution {} of workflow '{}'",
            execution.id, workflow.name
        );

        let cancel = self.cancellations.register(&execution.id).await;

        execution.status = ExecutionStatus::Running;
        self.journal.update_execution(&execution).await?;

        let scope = self
            .sink
            .as_ref()
            .map(|sink| StreamScope::root(sink.clone(), &workflow.id, &execution.id));

        let started = Instant::now();
        let result = self
            .traverse(workflow, &execution.id, parameters, config, scope, cancel)
            .await;

        execution.completed_at = Some(Utc::now());
        match result {
            Ok(output) => {
                execution.status = ExecutionStatus::Completed;
                execution.result = Some(output);
                info!(
                    "Execution {} completed ({}ms)",
                    execution.id,
                    started.elapsed().as_millis()
                );
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                error!("Execution {} failed: {}", execution.id, e);
            }
        }
        self.journal.update_execution(&execution).await?;
        self.cancellations.unregister(&execution.id).await;

        Ok(execution)
    }

    /// Run a workflow as a nested execution and return its final output.
    ///
    /// Used by workflow-backed custom executors; the nested execution gets
    /// its own journal records and iteration budget but no event stream.
    pub async fn invoke_workflow(
        &self,
        workflow: &Workflow,
        parameters: Value,
        config: Value,
    ) -> Result<Value> {
        let mut execution =
            Execution::pending(&workflow.id, parameters.clone(), config.clone(), None);
        execution.status = ExecutionStatus::Running;
        self.journal.create_execution(&execution).await?;

        let cancel = self.cancellations.register(&execution.id).await;
        let result = self
            .traverse(workflow, &execution.id, parameters, config, None, cancel)
            .await;
        self.cancellations.unregister(&execution.id).await;

        self.finalize_nested(execution, result).await
    }

    /// Terminal bookkeeping shared by every nested execution.
    async fn finalize_nested(
        &self,
        mut execution: Execution,
        result: Result<Value>,
    ) -> Result<Value> {
        execution.completed_at = Some(Utc::now());
        match result {
            Ok(output) => {
                execution.status = ExecutionStatus::Completed;
                execution.result = Some(output.clone());
                self.journal.update_execution(&execution).await?;
                Ok(output)
            }
            Err(e) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
                self.journal.update_execution(&execution).await?;
                Err(e)
            }
        }
    }

    /// Walk the graph for one execution. Boxed so sub-workflow recursion
    /// can flow through it.
    fn traverse<'a>(
        &'a self,
        workflow: &'a Workflow,
        execution_id: &'a str,
        parameters: Value,
        config: Value,
        scope: Option<StreamScope>,
        cancel: Arc<AtomicBool>,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let result = self
                .traverse_inner(workflow, execution_id, parameters, config, scope.clone(), cancel)
                .await;
            if let Some(scope) = &scope {
                match &result {
                    Ok(output) => {
                        scope.emit(EventKind::WorkflowComplete, json!({"result": output}), None)
                    }
                    Err(e) => {
                        scope.emit(EventKind::Error, json!({"message": e.to_string()}), None)
                    }
                }
            }
            result
        })
    }

    async fn traverse_inner(
        &self,
        workflow: &Workflow,
        execution_id: &str,
        parameters: Value,
        config: Value,
        scope: Option<StreamScope>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Value> {
        validate_workflow(workflow)?;

        if let Some(scope) = &scope {
            scope.emit(
                EventKind::WorkflowStart,
                json!({"name": workflow.name}),
                None,
            );
        }

        let nodes = workflow.node_index();
        let edges = workflow.edge_index();

        let mut ctx = Context::new(
            parameters,
            config,
            Value::Object(workflow.state.clone()),
            Value::Object(Map::new()),
        );

        let mut current = workflow.start_node.clone();
        let mut iterations: u32 = 0;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }
            if iterations >= workflow.max_iterations {
                return Err(Error::IterationLimit(workflow.max_iterations));
            }
            iterations += 1;

            let node = *nodes.get(current.as_str()).ok_or_else(|| {
                Error::Graph(format!("node not found during execution: '{}'", current))
            })?;

            let output = self
                .visit_node(execution_id, node, &mut ctx, scope.as_ref(), &cancel)
                .await?;

            if current == workflow.end_node {
                return Ok(output);
            }

            let edge = edges.get(current.as_str()).ok_or_else(|| {
                Error::Graph(format!("no outgoing edge found from '{}'", current))
            })?;
            current = next_node(edge, &ctx, &nodes)?;
            debug!("Following edge '{}' to '{}'", edge.id(), current);
        }
    }

    /// One node visit: journal entry, config expansion, dispatch, setState,
    /// journal reconciliation, events.
    async fn visit_node(
        &self,
        execution_id: &str,
        node: &Node,
        ctx: &mut Context,
        scope: Option<&StreamScope>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Value> {
        let mut record = NodeExecution::running(execution_id, &node.id);
        self.journal.create_node_execution(&record).await?;

        if let Some(scope) = scope {
            scope.emit(
                EventKind::NodeStart,
                json!({"nodeId": node.id, "nodeType": node.node_type}),
                None,
            );
        }
        info!("Executing node '{}' [{}]", node.id, node.node_type);
        let started = Instant::now();

        let result = match self.dispatch(node, ctx, scope, cancel).await {
            Ok(output) => self.apply_set_state(node, ctx, output, scope),
            Err(e) => Err(e),
        };

        record.completed_at = Some(Utc::now());
        match result {
            Ok(output) => {
                record.status = ExecutionStatus::Completed;
                record.output = Some(output.clone());
                self.journal.update_node_execution(&record).await?;

                if let Value::Object(parent) = &mut ctx.parent {
                    parent.insert(node.id.clone(), output.clone());
                }

                if let Some(scope) = scope {
                    let send_on_complete = node
                        .streaming
                        .as_ref()
                        .map(|s| s.send_on_complete)
                        .unwrap_or(true);
                    if send_on_complete {
                        scope.emit(
                            EventKind::NodeComplete,
                            output.clone(),
                            Some(json!({
                                "nodeId": node.id,
                                "duration_ms": started.elapsed().as_millis() as u64,
                            })),
                        );
                    }
                }
                Ok(output)
            }
            Err(e) => {
                record.status = ExecutionStatus::Failed;
                record.error = Some(e.to_string());
                self.journal.update_node_execution(&record).await?;
                error!("Node '{}' failed: {}", node.id, e);
                Err(e)
            }
        }
    }

    /// Expand the node config and run the matching executor (or recurse
    /// into a sub-workflow for the reserved type).
    async fn dispatch(
        &self,
        node: &Node,
        ctx: &Context,
        scope: Option<&StreamScope>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Value> {
        let expanded = template::expand(&node.config, ctx).map_err(|e| match e {
            Error::Template(msg) => Error::Template(format!("node '{}': {}", node.id, msg)),
            other => other,
        })?;

        if node.node_type == WORKFLOW_EXECUTOR_TYPE {
            return self
                .run_sub_workflow(node, &expanded, ctx, scope, cancel)
                .await;
        }

        let executor = self
            .registry
            .resolve(&node.node_type, &self.definitions)
            .await?;

        validate_executor_config(executor.config_schema().as_ref(), &expanded).map_err(
            |e| match e {
                Error::Executor(msg) => Error::Executor(format!("node '{}': {}", node.id, msg)),
                other => other,
            },
        )?;

        let streaming = scope.is_some()
            && node.streaming.as_ref().map(|s| s.enabled).unwrap_or(false)
            && executor.supports_streaming();

        let mut input = ExecutorInput::new(
            ctx.parameters.clone(),
            ctx.config.clone(),
            ctx.state.clone(),
            ctx.parent.clone(),
        );
        input.context = scope.map(|s| s.streaming_context());
        input.engine = Some(self.handle());

        let on_chunk: Option<ChunkFn> = if streaming {
            let scope = scope.expect("streaming implies a scope").clone();
            let node_id = node.id.clone();
            let node_type = node.node_type.clone();
            Some(Arc::new(move |chunk: Value| {
                scope.emit(
                    EventKind::NodeChunk,
                    chunk,
                    Some(json!({"nodeId": node_id, "nodeType": node_type})),
                );
            }))
        } else {
            None
        };

        executor
            .run(&expanded, &input, on_chunk)
            .await
            .map_err(|e| match e {
                Error::Executor(msg) => Error::Executor(format!("node '{}': {}", node.id, msg)),
                other => other,
            })
    }

    /// Reserved `workflow_executor` dispatch: run the referenced workflow
    /// as a sub-execution whose output becomes this node's output.
    async fn run_sub_workflow(
        &self,
        node: &Node,
        expanded: &Value,
        ctx: &Context,
        scope: Option<&StreamScope>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Value> {
        let workflow_id = expanded
            .get("workflow_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::Executor(format!(
                    "node '{}': workflow_executor requires 'workflow_id' in config",
                    node.id
                ))
            })?
            .to_string();
        let parameters = expanded.get("parameters").cloned().ok_or_else(|| {
            Error::Executor(format!(
                "node '{}': workflow_executor requires 'parameters' in config",
                node.id
            ))
        })?;

        let stored = self
            .definitions
            .get_workflow(&workflow_id)
            .await?
            .ok_or_else(|| {
                Error::SubWorkflow(format!(
                    "Workflow execution failed for workflow_id '{}': workflow not found",
                    workflow_id
                ))
            })?;
        let sub_workflow = parse_workflow(&stored.definition)?;

        // Sub-executions inherit the caller's config snapshot.
        let mut sub_execution = Execution::pending(
            &workflow_id,
            parameters.clone(),
            ctx.config.clone(),
            None,
        );
        sub_execution.status = ExecutionStatus::Running;
        self.journal.create_execution(&sub_execution).await?;

        info!(
            "Node '{}' entering sub-workflow '{}' as execution {}",
            node.id, workflow_id, sub_execution.id
        );

        let sub_scope = scope.map(|s| s.child(&workflow_id, &sub_execution.id, &node.id));
        let result = self
            .traverse(
                &sub_workflow,
                &sub_execution.id,
                parameters,
                ctx.config.clone(),
                sub_scope,
                cancel.clone(),
            )
            .await;

        self.finalize_nested(sub_execution, result)
            .await
            .map_err(|e| {
                Error::SubWorkflow(format!(
                    "Workflow execution failed for workflow_id '{}': {}",
                    workflow_id, e
                ))
            })
    }

    /// Evaluate setState rules with `output` bound, then apply all results
    /// at once so state is never observable half-updated.
    fn apply_set_state(
        &self,
        node: &Node,
        ctx: &mut Context,
        output: Value,
        scope: Option<&StreamScope>,
    ) -> Result<Value> {
        if node.set_state.is_empty() {
            return Ok(output);
        }

        let scoped = ctx.with_output(output.clone());
        let mut updates = Vec::with_capacity(node.set_state.len());
        for set_state in &node.set_state {
            let value = template::run_rule(&set_state.rule, &scoped).map_err(|e| {
                Error::StateUpdate(format!(
                    "Failed to execute setState for key '{}': {}",
                    set_state.key, e
                ))
            })?;
            updates.push((set_state.key.clone(), value));
        }

        if let Value::Object(state) = &mut ctx.state {
            for (key, value) in updates {
                state.insert(key, value);
            }
        }

        if let Some(scope) = scope {
            scope.emit(
                EventKind::StateUpdated,
                ctx.state.clone(),
                Some(json!({"nodeId": node.id})),
            );
        }

        Ok(output)
    }
}

/// Resolve an outgoing edge to the next node id.
fn next_node(edge: &Edge, ctx: &Context, nodes: &HashMap<&str, &Node>) -> Result<String> {
    match edge {
        Edge::Static { to, .. } => Ok(to.clone()),
        Edge::Dynamic { id, rule, .. } => {
            let value = template::run_rule(rule, ctx).map_err(|e| match e {
                Error::Template(msg) => Error::Template(format!("edge '{}': {}", id, msg)),
                other => other,
            })?;
            let Value::String(target) = value else {
                return Err(Error::Graph(format!(
                    "Dynamic edge '{}' returned a non-string value",
                    id
                )));
            };
            require_known_node(id, target, nodes)
        }
        Edge::Conditional { id, conditions, .. } => {
            let target = template::eval_conditions(conditions, ctx).map_err(|e| match e {
                Error::Template(msg) => Error::Template(format!("edge '{}': {}", id, msg)),
                other => other,
            })?;
            require_known_node(id, target, nodes)
        }
    }
}

fn require_known_node(
    edge_id: &str,
    target: String,
    nodes: &HashMap<&str, &Node>,
) -> Result<String> {
    if !nodes.contains_key(target.as_str()) {
        return Err(Error::Graph(format!(
            "Dynamic edge '{}' returned invalid node ID '{}'",
            edge_id, target
        )));
    }
    Ok(target)
}
