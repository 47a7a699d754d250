//! Per-execution cancellation signals.
//!
//! The cancel API endpoint flips a flag the orchestrator checks between
//! node visits. Without this, cancelling would only update the stored
//! status while the traversal loop keeps running. Sub-executions share
//! their parent's flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelRegistry {
    signals: Arc<tokio::sync::Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution and return its cancellation flag.
    pub async fn register(&self, execution_id: &str) -> Arc<AtomicBool> {
        let signal = Arc::new(AtomicBool::new(false));
        self.signals
            .lock()
            .await
            .insert(execution_id.to_string(), signal.clone());
        signal
    }

    /// Request cancellation. Returns false if the execution is not running.
    pub async fn request_cancel(&self, execution_id: &str) -> bool {
        if let Some(signal) = self.signals.lock().await.get(execution_id) {
            signal.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Drop an execution's flag once it terminates.
    pub async fn unregister(&self, execution_id: &str) {
        self.signals.lock().await.remove(execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_round_trip() {
        let registry = CancelRegistry::new();
        let signal = registry.register("exec-1").await;
        assert!(!signal.load(Ordering::SeqCst));

        assert!(registry.request_cancel("exec-1").await);
        assert!(signal.load(Ordering::SeqCst));

        registry.unregister("exec-1").await;
        assert!(!registry.request_cancel("exec-1").await);
    }

    #[tokio::test]
    async fn test_cancel_unknown_execution() {
        let registry = CancelRegistry::new();
        assert!(!registry.request_cancel("ghost").await);
    }
}
