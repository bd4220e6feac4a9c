//! Per-document reconciliation locks.
//!
//! Two reconciliations of the same `doc_id` never overlap; different
//! documents proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries beyond this count trigger a sweep of idle locks.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct DocLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `doc_id`. Released when the guard drops.
    pub async fn acquire(&self, doc_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > SWEEP_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry(doc_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
