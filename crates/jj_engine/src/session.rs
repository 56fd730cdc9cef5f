use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jj_core::ExecutionSession;

/// Shared view of the job currently being watched.
///
/// The watcher writes it as the build moves from queue to executor; the
/// cancellation controller reads a snapshot when the user interrupts.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<Mutex<ExecutionSession>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, job: &str) {
        *self.lock() = ExecutionSession::new(job);
    }

    pub fn set_queue(&self, queue_id: u64) {
        self.lock().queue_id = queue_id;
    }

    pub fn set_build(&self, build_number: u64) {
        self.lock().build_number = build_number;
    }

    pub fn clear(&self) {
        *self.lock() = ExecutionSession::default();
    }

    pub fn snapshot(&self) -> ExecutionSession {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionSession> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
