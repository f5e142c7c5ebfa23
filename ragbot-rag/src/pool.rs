//! Bounded pools of shared handles (store sessions, embedding clients).
//!
//! A [`ResourcePool`] is an ordinary value: construct it at startup, share it
//! behind an `Arc`, and [`close`](ResourcePool::close) it at shutdown. Tests
//! build their own isolated pools.

use std::ops::Deref;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use ragbot_core::{RagError, Result};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

/// A fixed set of handles checked out one request at a time.
///
/// When every handle is checked out, [`acquire`](ResourcePool::acquire)
/// suspends until one is returned or the acquisition timeout elapses.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ResourcePool::replicated("store", store.clone(), 4, Duration::from_secs(5));
/// let session = pool.acquire().await?;
/// let hits = session.similarity_search(&embedding, 5).await?;
/// // `session` goes back to the pool when dropped
/// ```
#[derive(Debug)]
pub struct ResourcePool<T> {
    name: String,
    slots: Mutex<Vec<T>>,
    permits: Semaphore,
    size: usize,
    acquire_timeout: Duration,
}

impl<T> ResourcePool<T> {
    /// Create a pool owning the given handles.
    pub fn new(name: impl Into<String>, items: Vec<T>, acquire_timeout: Duration) -> Self {
        let size = items.len();
        Self {
            name: name.into(),
            permits: Semaphore::new(size),
            slots: Mutex::new(items),
            size,
            acquire_timeout,
        }
    }

    /// Create a pool of `size` clones of one handle.
    pub fn replicated(
        name: impl Into<String>,
        item: T,
        size: usize,
        acquire_timeout: Duration,
    ) -> Self
    where
        T: Clone,
    {
        Self::new(name, vec![item; size], acquire_timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of handles.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of handles not currently checked out.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out handles. Pending and future acquisitions fail.
    pub fn close(&self) {
        debug!(pool = %self.name, "closing resource pool");
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Check out a handle, waiting at most the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`RagError::ResourcePoolTimeout`] if no handle frees up in time
    /// - [`RagError::StoreUnavailable`] if the pool has been closed
    pub async fn acquire(&self) -> Result<PoolGuard<'_, T>> {
        let permit = match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                return Err(RagError::store_unavailable(&self.name, "resource pool is closed"));
            }
            Err(_elapsed) => {
                warn!(pool = %self.name, waited = ?self.acquire_timeout, "resource pool exhausted");
                return Err(RagError::ResourcePoolTimeout {
                    pool: self.name.clone(),
                    waited: self.acquire_timeout,
                });
            }
        };

        let item = self.lock_slots().pop().ok_or_else(|| {
            RagError::store_unavailable(&self.name, "resource pool has no free handle")
        })?;
        debug!(pool = %self.name, available = self.available(), "checked out handle");
        Ok(PoolGuard { pool: self, item: Some(item), _permit: permit })
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out handle. Returned to its pool on drop.
pub struct PoolGuard<'a, T> {
    pool: &'a ResourcePool<T>,
    item: Option<T>,
    // Declared last: the handle is back in `slots` before the permit frees.
    _permit: SemaphorePermit<'a>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `item` is only taken in `drop`.
        self.item.as_ref().unwrap_or_else(|| unreachable!("pool guard used after drop"))
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.lock_slots().push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_returns_handle_on_drop() {
        let pool = ResourcePool::new("test", vec![1u8, 2], Duration::from_secs(1));
        assert_eq!(pool.available(), 2);
        {
            let a = pool.acquire().await.unwrap();
            let b = pool.acquire().await.unwrap();
            assert_ne!(*a, *b);
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out() {
        let pool = ResourcePool::replicated("store", (), 1, Duration::from_millis(100));
        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert_eq!(
            err,
            RagError::ResourcePoolTimeout {
                pool: "store".to_string(),
                waited: Duration::from_millis(100)
            }
        );
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let pool = ResourcePool::replicated("store", (), 1, Duration::from_secs(1));
        pool.close();
        assert!(pool.is_closed());
        let err = pool.acquire().await.err().unwrap();
        assert_eq!(err.kind(), ragbot_core::ErrorKind::StoreUnavailable);
    }
}
