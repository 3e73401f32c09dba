//! Process-wide write serialisation.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Serialises mutating service operations within one process.
///
/// Every service built by the composition root shares one gate. An operation
/// that reads state, checks a rule and then writes holds the gate for that
/// whole span, so two allocations against the same payment cannot both pass
/// the "enough unallocated" check. Cross-process races are caught by the
/// storage adapters instead.
#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    inner: Arc<Mutex<()>>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive write access.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }
}
