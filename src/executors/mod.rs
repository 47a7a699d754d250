//! Executors: the processing implementations behind node types.

mod custom;
mod debug;
mod http;
mod passthrough;
mod registry;
mod script;
mod transform;
mod types;
mod wait;

pub use custom::WorkflowBackedExecutor;
pub use debug::DebugExecutor;
pub use http::HttpExecutor;
pub use passthrough::PassthroughExecutor;
pub use registry::ExecutorRegistry;
pub use script::ScriptExecutor;
pub use transform::TransformExecutor;
pub use types::{ChunkFn, Executor, ExecutorInput};
pub use wait::WaitExecutor;

/// Reserved node type handled by the orchestrator itself.
pub const WORKFLOW_EXECUTOR_TYPE: &str = "workflow_executor";
