use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits one workflow at a time. A second trigger while a run is in
/// flight is refused rather than queued.
#[derive(Debug, Clone)]
pub struct WorkflowGate {
    semaphore: Arc<Semaphore>,
}

impl Default for WorkflowGate {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// `None` when a workflow already holds the gate.
    pub fn try_enter(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}
