//! # Concurrency Gate
//!
//! Per-series, in-process serialization of allocation requests.
//!
//! ## Queueing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Allocation Gate                                 │
//! │                                                                         │
//! │  locks: HashMap<SeriesKey, Arc<tokio::Mutex<()>>>                      │
//! │                                                                         │
//! │  ticket/A  ──► [holder] ◄── caller 2 ◄── caller 3     (FIFO queue)     │
//! │  invoice/F1 ─► [holder]                               (runs in parallel)│
//! │                                                                         │
//! │  acquire(key, timeout)                                                 │
//! │     │                                                                   │
//! │     ├── free        → GatePermit immediately                           │
//! │     ├── held        → wait in FIFO order                               │
//! │     └── timed out   → GateTimeout, never touches the store             │
//! │                                                                         │
//! │  Dropping the last permit for a key removes its map entry.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gate only keeps same-process callers from piling onto SQLite's busy
//! handler. Correctness across terminals comes from the store's write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use folio_core::{FolioError, SeriesKey};

type LockMap = HashMap<SeriesKey, Arc<AsyncMutex<()>>>;

/// Typed map of per-series async mutexes.
///
/// Cheap to clone; clones share the same locks.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    locks: Arc<Mutex<LockMap>>,
}

/// Exclusive right to allocate in one series.
///
/// Held for the whole store transaction; released on drop.
#[derive(Debug)]
pub struct GatePermit {
    key: SeriesKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    ///
    /// ## Errors
    /// `GateTimeout` when `timeout` elapses while queued.
    pub async fn acquire(
        &self,
        key: &SeriesKey,
        timeout: Option<Duration>,
    ) -> Result<GatePermit, FolioError> {
        let mutex = {
            let mut locks = lock_map(&self.locks);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let started = Instant::now();
        let guard = match timeout {
            None => mutex.lock_owned().await,
            Some(limit) => match tokio::time::timeout(limit, mutex.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!(series = %key, waited_ms, "Allocation gate timed out");
                    release_if_unused(&self.locks, key);
                    return Err(FolioError::GateTimeout {
                        document_type: key.document_type,
                        series: key.series.clone(),
                        waited_ms,
                    });
                }
            },
        };

        debug!(
            series = %key,
            waited_ms = started.elapsed().as_millis() as u64,
            "Allocation gate acquired"
        );

        Ok(GatePermit {
            key: key.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    /// Number of keys with a holder or waiters.
    pub fn active_keys(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

impl GatePermit {
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // Release the async mutex before inspecting the reference count.
        self.guard.take();
        release_if_unused(&self.locks, &self.key);
    }
}

/// Removes the entry for `key` when only the map still references it.
///
/// Waiters clone the `Arc` under the map lock, so a count of one means
/// nobody holds or awaits this mutex.
fn release_if_unused(locks: &Mutex<LockMap>, key: &SeriesKey) {
    let mut locks = lock_map(locks);
    if locks
        .get(key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        locks.remove(key);
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    // The map holds no invariant a panicking holder could break.
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::DocumentType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(series: &str) -> SeriesKey {
        SeriesKey::new(DocumentType::Ticket, series)
    }

    #[tokio::test]
    async fn test_permit_release_cleans_map() {
        let gate = ConcurrencyGate::new();
        {
            let permit = gate.acquire(&key("A"), None).await.unwrap();
            assert_eq!(permit.key(), &key("A"));
            assert_eq!(gate.active_keys(), 1);
        }
        assert_eq!(gate.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let gate = ConcurrencyGate::new();
        let _a = gate.acquire(&key("A"), None).await.unwrap();
        let b = gate
            .acquire(&key("B"), Some(Duration::from_millis(50)))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_queued_caller_times_out() {
        let gate = ConcurrencyGate::new();
        let _held = gate.acquire(&key("A"), None).await.unwrap();

        let err = gate
            .acquire(&key("A"), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::GateTimeout { .. }));
        // The holder still owns the entry.
        assert_eq!(gate.active_keys(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_holder_per_key() {
        let gate = ConcurrencyGate::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire(&key("A"), None).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(gate.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_arrival_order() {
        let gate = ConcurrencyGate::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = gate.acquire(&key("A"), None).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let gate = gate.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire(&key("A"), None).await.unwrap();
                order.lock().unwrap().push(i);
            }));
            // Let each waiter enqueue before the next one starts.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
