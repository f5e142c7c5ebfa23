//! In-flight requests addressable by request id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use ragbot_core::RequestId;

use crate::state::RequestControl;

type Entries = HashMap<RequestId, Vec<(u64, Arc<RequestControl>)>>;

/// Maps request ids to the controls of their in-flight requests.
///
/// Several requests may share an id; cancelling the id cancels all of them.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Arc<Mutex<Entries>>,
    next_key: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `control` under `request_id` until the returned guard drops.
    pub fn register(&self, request_id: RequestId, control: Arc<RequestControl>) -> Registration {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).entry(request_id.clone()).or_default().push((key, control));
        Registration { entries: Arc::clone(&self.entries), request_id, key }
    }

    /// Cancel every in-flight request registered under `request_id` and
    /// remove them from the registry.
    ///
    /// Returns `true` if at least one request moved to `Cancelled`.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        let removed = lock(&self.entries).remove(request_id).unwrap_or_default();
        // Cancel outside the lock; `cancel` logs.
        removed.iter().fold(false, |any, (_, control)| control.cancel() | any)
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        lock(&self.entries).values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its request from the registry when dropped.
#[derive(Debug)]
pub struct Registration {
    entries: Arc<Mutex<Entries>>,
    request_id: RequestId,
    key: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = lock(&self.entries);
        if let Some(list) = entries.get_mut(&self.request_id) {
            list.retain(|(key, _)| *key != self.key);
            if list.is_empty() {
                entries.remove(&self.request_id);
            }
        }
    }
}

fn lock(entries: &Mutex<Entries>) -> std::sync::MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
