//! HTTP API server for strand.
//!
//! Workflow/config/executor CRUD plus execution endpoints. A truthy
//! `stream` (body field or `?stream=true` query) switches the execute
//! response to a server-sent-events stream of engine events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::Stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::{CancelRegistry, EventSink, Orchestrator};
use crate::error::Error;
use crate::executors::ExecutorRegistry;
use crate::storage::{
    ConfigRecord, CustomExecutorRecord, DefinitionStore, Journal, MemoryJournal, SqliteStorage,
    StoredWorkflow,
};
use crate::workflow::{parse_workflow, validate_workflow};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub storage: SqliteStorage,
    pub registry: Arc<ExecutorRegistry>,
    pub cancellations: CancelRegistry,
}

impl AppState {
    pub fn new(storage: SqliteStorage, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            storage,
            registry,
            cancellations: CancelRegistry::new(),
        }
    }

    /// Build an orchestrator against the durable journal, or an in-memory
    /// one for dry runs.
    fn orchestrator(&self, dry_run: bool) -> Orchestrator {
        let definitions: Arc<dyn DefinitionStore> = Arc::new(self.storage.clone());
        let journal: Arc<dyn Journal> = if dry_run {
            Arc::new(MemoryJournal::new())
        } else {
            Arc::new(self.storage.clone())
        };
        Orchestrator::new(self.registry.clone(), definitions, journal)
            .with_cancellations(self.cancellations.clone())
    }
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).delete(delete_workflow),
        )
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/executions", get(list_executions))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/nodes", get(list_node_executions))
        .route("/api/executions/{id}/cancel", post(cancel_execution))
        .route("/api/configs", get(list_configs).post(create_config))
        .route("/api/configs/{id}", get(get_config))
        .route("/api/executors", get(list_executors).post(create_executor))
        .route("/api/executors/{type}", axum::routing::delete(delete_executor))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(e: Error) -> (StatusCode, Json<Value>) {
    error!("API error: {:?}", e);
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(e.to_external_json()))
}

fn not_found(what: &str, id: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"code": "NOT_FOUND", "message": format!("{} '{}' not found", what, id)}})),
    )
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

// ============================================================================
// Workflows
// ============================================================================

async fn create_workflow(
    State(state): State<AppState>,
    Json(mut definition): Json<Value>,
) -> impl IntoResponse {
    if !definition.is_object() {
        return error_response(Error::Parse(
            "workflow definition must be a JSON object".to_string(),
        ));
    }

    // Assign an id up front so the stored definition matches the record.
    if definition.get("id").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
        definition["id"] = json!(uuid::Uuid::new_v4().to_string());
    }

    let raw = definition.to_string();
    let workflow = match parse_workflow(&raw) {
        Ok(workflow) => workflow,
        Err(e) => return error_response(e),
    };
    if let Err(e) = validate_workflow(&workflow) {
        return error_response(e);
    }

    let now = Utc::now();
    let record = StoredWorkflow {
        id: workflow.id.clone(),
        name: workflow.name.clone(),
        definition: raw,
        created_at: now,
        updated_at: now,
    };
    match state.storage.save_workflow(&record).await {
        Ok(()) => (StatusCode::CREATED, Json(json!(record))),
        Err(e) => error_response(e),
    }
}

async fn list_workflows(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list_workflows().await {
        Ok(workflows) => (StatusCode::OK, Json(json!(workflows))),
        Err(e) => error_response(e),
    }
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => (StatusCode::OK, Json(json!(workflow))),
        Ok(None) => not_found("Workflow", &id),
        Err(e) => error_response(e),
    }
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.storage.delete_workflow(&id).await {
        Ok(true) => (StatusCode::OK, Json(json!({"deleted": true}))),
        Ok(false) => not_found("Workflow", &id),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest {
    #[serde(default = "empty_object")]
    parameters: Value,
    #[serde(default)]
    config_id: Option<String>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    dry_run: bool,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Default for ExecuteRequest {
    fn default() -> Self {
        Self {
            parameters: empty_object(),
            config_id: None,
            stream: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteQuery {
    #[serde(default)]
    stream: Option<bool>,
}

async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExecuteQuery>,
    body: axum::body::Bytes,
) -> axum::response::Response {
    // An absent body means "run with defaults".
    let request: ExecuteRequest = if body.is_empty() {
        ExecuteRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return error_response(Error::Json(e)).into_response(),
        }
    };
    let stream = query.stream.unwrap_or(request.stream);

    let stored = match state.storage.get_workflow(&id).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return not_found("Workflow", &id).into_response(),
        Err(e) => return error_response(e).into_response(),
    };
    let workflow = match parse_workflow(&stored.definition) {
        Ok(workflow) => workflow,
        Err(e) => return error_response(e).into_response(),
    };

    let orchestrator = state.orchestrator(request.dry_run);

    if stream {
        let (sink, rx) = EventSink::channel();
        let orchestrator = orchestrator.with_stream(sink);
        let parameters = request.parameters.clone();
        let config_id = request.config_id.clone();

        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(&workflow, parameters, config_id).await {
                error!("Streamed execution of '{}' failed to start: {}", workflow.id, e);
            }
        });

        return sse_response(rx).into_response();
    }

    match orchestrator
        .execute(&workflow, request.parameters, request.config_id)
        .await
    {
        Ok(execution) => (StatusCode::OK, Json(json!(execution))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

fn sse_response(
    rx: tokio::sync::mpsc::UnboundedReceiver<crate::engine::StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(json))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListExecutionsQuery {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ListExecutionsQuery>,
) -> impl IntoResponse {
    match state
        .storage
        .list_executions(query.workflow_id.as_deref(), query.limit)
        .await
    {
        Ok(executions) => (StatusCode::OK, Json(json!(executions))),
        Err(e) => error_response(e),
    }
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.storage.get_execution(&id).await {
        Ok(Some(execution)) => (StatusCode::OK, Json(json!(execution))),
        Ok(None) => not_found("Execution", &id),
        Err(e) => error_response(e),
    }
}

async fn list_node_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.storage.list_node_executions(&id).await {
        Ok(nodes) => (StatusCode::OK, Json(json!(nodes))),
        Err(e) => error_response(e),
    }
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.cancellations.request_cancel(&id).await {
        (StatusCode::OK, Json(json!({"cancelled": true})))
    } else {
        not_found("Running execution", &id)
    }
}

// ============================================================================
// Configs
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateConfigRequest {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    variables: Map<String, Value>,
}

async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> impl IntoResponse {
    let now = Utc::now();
    let record = ConfigRecord {
        id: request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: request.name,
        variables: request.variables,
        created_at: now,
        updated_at: now,
    };
    match state.storage.save_config(&record).await {
        Ok(()) => (StatusCode::CREATED, Json(json!(record))),
        Err(e) => error_response(e),
    }
}

async fn list_configs(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list_configs().await {
        Ok(configs) => (StatusCode::OK, Json(json!(configs))),
        Err(e) => error_response(e),
    }
}

async fn get_config(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.storage.get_config(&id).await {
        Ok(Some(config)) => (StatusCode::OK, Json(json!(config))),
        Ok(None) => not_found("Config", &id),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Custom executors
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExecutorRequest {
    #[serde(rename = "type")]
    type_name: String,
    source_workflow_id: String,
    #[serde(default)]
    config_schema: Option<Value>,
}

async fn create_executor(
    State(state): State<AppState>,
    Json(request): Json<CreateExecutorRequest>,
) -> impl IntoResponse {
    if state.registry.has_builtin(&request.type_name) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": {"code": "CONFLICT", "message": format!("'{}' is a built-in executor type", request.type_name)}})),
        );
    }

    match state.storage.get_workflow(&request.source_workflow_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Workflow", &request.source_workflow_id),
        Err(e) => return error_response(e),
    }

    let record = CustomExecutorRecord {
        type_name: request.type_name.clone(),
        source_workflow_id: request.source_workflow_id,
        config_schema: request.config_schema,
        created_at: Utc::now(),
    };
    match state.storage.save_custom_executor(&record).await {
        Ok(()) => {
            // A replaced record must not be served from the old cache entry.
            state.registry.clear_cache(Some(&request.type_name)).await;
            (StatusCode::CREATED, Json(json!(record)))
        }
        Err(e) => error_response(e),
    }
}

async fn list_executors(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list_custom_executors().await {
        Ok(custom) => (
            StatusCode::OK,
            Json(json!({
                "builtin": state.registry.builtin_types(),
                "custom": custom,
            })),
        ),
        Err(e) => error_response(e),
    }
}

async fn delete_executor(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
) -> impl IntoResponse {
    match state.storage.delete_custom_executor(&type_name).await {
        Ok(true) => {
            state.registry.clear_cache(Some(&type_name)).await;
            (StatusCode::OK, Json(json!({"deleted": true})))
        }
        Ok(false) => not_found("Executor", &type_name),
        Err(e) => error_response(e),
    }
}
