use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strand::api::{create_router, AppState};
use strand::config::Config;
use strand::engine::Orchestrator;
use strand::error::Result;
use strand::executors::ExecutorRegistry;
use strand::storage::{DefinitionStore, Journal, MemoryJournal, SqliteStorage, StoredWorkflow};
use strand::workflow::{parse_workflow_file, validate_workflow};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Graph-based workflow execution engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Server {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowActions,
    },
    /// Inspect executions
    Execution {
        #[command(subcommand)]
        action: ExecutionActions,
    },
}

#[derive(Subcommand)]
enum WorkflowActions {
    /// Create (or update) a workflow from a JSON or YAML file
    Create {
        /// Path to the definition file
        file: PathBuf,
    },
    /// List stored workflows
    List,
    /// Run a workflow
    Run {
        /// Workflow id
        id: String,
        /// JSON parameters
        #[arg(short, long)]
        params: Option<String>,
        /// Config id to resolve variables from
        #[arg(short, long)]
        config: Option<String>,
        /// Execute against an in-memory journal, leaving no records behind
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ExecutionActions {
    /// List recent executions
    List {
        /// Filter by workflow id
        #[arg(short, long)]
        workflow: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one execution with its node executions
    Show {
        /// Execution id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "strand=info,tower_http=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    let database_path = config.database_path();
    if let Some(dir) = database_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let storage = SqliteStorage::open(&database_path)?;
    let registry = Arc::new(ExecutorRegistry::new());

    match cli.command {
        Commands::Server { port } => {
            let port = port.unwrap_or(config.server.port);
            let state = AppState::new(storage, registry);
            let router = create_router(state);

            let addr = format!("{}:{}", config.server.host, port);
            tracing::info!("strand listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, router).await?;
        }

        Commands::Workflow { action } => match action {
            WorkflowActions::Create { file } => {
                let workflow = {
                    let mut workflow = parse_workflow_file(&file)?;
                    if workflow.id.is_empty() {
                        workflow.id = uuid::Uuid::new_v4().to_string();
                    }
                    workflow
                };
                validate_workflow(&workflow)?;

                let now = Utc::now();
                storage
                    .save_workflow(&StoredWorkflow {
                        id: workflow.id.clone(),
                        name: workflow.name.clone(),
                        definition: serde_json::to_string_pretty(&workflow)?,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                println!("Created workflow '{}' ({})", workflow.name, workflow.id);
            }
            WorkflowActions::List => {
                for workflow in storage.list_workflows().await? {
                    println!("{}  {}", workflow.id, workflow.name);
                }
            }
            WorkflowActions::Run {
                id,
                params,
                config: config_id,
                dry_run,
            } => {
                let stored = storage
                    .get_workflow(&id)
                    .await?
                    .ok_or_else(|| strand::Error::Storage(format!("Workflow '{}' not found", id)))?;
                let workflow = strand::workflow::parse_workflow(&stored.definition)?;

                let parameters = match params {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => serde_json::json!({}),
                };

                let definitions: Arc<dyn DefinitionStore> = Arc::new(storage.clone());
                let journal: Arc<dyn Journal> = if dry_run {
                    Arc::new(MemoryJournal::new())
                } else {
                    Arc::new(storage.clone())
                };
                let orchestrator = Orchestrator::new(registry, definitions, journal);

                let execution = orchestrator.execute(&workflow, parameters, config_id).await?;
                println!("{}", serde_json::to_string_pretty(&execution)?);
            }
        },

        Commands::Execution { action } => match action {
            ExecutionActions::List { workflow, limit } => {
                for execution in storage.list_executions(workflow.as_deref(), limit).await? {
                    println!(
                        "{}  {}  {}  {}",
                        execution.id, execution.workflow_id, execution.status, execution.created_at
                    );
                }
            }
            ExecutionActions::Show { id } => {
                let execution = storage
                    .get_execution(&id)
                    .await?
                    .ok_or_else(|| strand::Error::Storage(format!("Execution '{}' not found", id)))?;
                println!("{}", serde_json::to_string_pretty(&execution)?);
                for node in storage.list_node_executions(&id).await? {
                    println!(
                        "  {}  {}  {}",
                        node.node_id,
                        node.status,
                        node.error.as_deref().unwrap_or("-")
                    );
                }
            }
        },
    }

    Ok(())
}
