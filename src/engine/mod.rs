//! Execution engine.

mod cancel;
mod orchestrator;
mod stream;

pub use cancel::CancelRegistry;
pub use orchestrator::Orchestrator;
pub use stream::{sse_frame, EventKind, EventSink, StreamEvent, StreamScope, StreamingContext};
