//! # Sequence Allocator
//!
//! Hands out the next number of a series: gate first, then one store
//! transaction.
//!
//! ## Allocation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         allocate(key, actor)                            │
//! │                                                                         │
//! │  caller task                         spawned task                       │
//! │  ───────────                         ────────────                       │
//! │  gate.acquire(key, timeout) ──┐                                         │
//! │     │ GateTimeout? → error    │                                         │
//! │     ▼                         │                                         │
//! │  tokio::spawn ────────────────┼──► BEGIN                                │
//! │     │                         │    lock_active   (UnknownSeries)        │
//! │     │                         │    fetch_locked                         │
//! │     │                         │    current > max (SequenceExhausted)    │
//! │     │                         │    advance                              │
//! │     │                         │    COMMIT                               │
//! │     │                         │    refresh cache, record `allocate`     │
//! │     │                         │    drop permit                          │
//! │     ▼                         │                                         │
//! │  await JoinHandle ◄───────────┘                                         │
//! │                                                                         │
//! │  If the caller goes away after the spawn, the spawned task still       │
//! │  commits (or rolls back) and releases the gate.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, error, info, warn};

use folio_core::validation::{validate_actor, validate_series};
use folio_core::{Allocation, FolioError, OperationKind, SequenceCounter, SeriesKey};
use folio_db::{CounterRepository, Database};

use crate::error::{LedgerError, LedgerResult};
use crate::gate::ConcurrencyGate;
use crate::oplog::OperationLog;

// =============================================================================
// Counter Cache
// =============================================================================

/// Read-through cache of counters, keyed by series.
///
/// Refreshed from the store after each successful allocation made by this
/// process and discarded on any failure. Never consulted by the allocation
/// transaction itself, which always reads the locked row.
#[derive(Debug, Default)]
pub struct CounterCache {
    entries: RwLock<HashMap<SeriesKey, SequenceCounter>>,
}

impl CounterCache {
    pub fn get(&self, key: &SeriesKey) -> Option<SequenceCounter> {
        self.read().get(key).cloned()
    }

    pub fn put(&self, counter: SequenceCounter) {
        self.write().insert(counter.key(), counter);
    }

    pub fn invalidate(&self, key: &SeriesKey) {
        self.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SeriesKey, SequenceCounter>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SeriesKey, SequenceCounter>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Transaction Step
// =============================================================================

/// Claims the next number of `key` inside an open transaction.
///
/// Returns the counter as it was before the increment; its `current_value`
/// is the claimed number. Nothing is committed here.
pub(crate) async fn take_next(
    conn: &mut SqliteConnection,
    key: &SeriesKey,
) -> LedgerResult<SequenceCounter> {
    if !CounterRepository::lock_active(conn, key).await? {
        return Err(FolioError::UnknownSeries {
            document_type: key.document_type,
            series: key.series.clone(),
        }
        .into());
    }

    let counter = CounterRepository::fetch_locked(conn, key).await?;

    if counter.is_exhausted() {
        warn!(
            series = %key,
            current = counter.current_value,
            max = counter.max_value,
            "Sequence exhausted"
        );
        return Err(FolioError::SequenceExhausted {
            document_type: key.document_type,
            series: key.series.clone(),
            current: counter.current_value,
            max: counter.max_value,
        }
        .into());
    }

    CounterRepository::advance(conn, key, counter.current_value).await?;

    Ok(counter)
}

// =============================================================================
// Allocator
// =============================================================================

/// Gate plus store transaction.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    db: Database,
    gate: ConcurrencyGate,
    cache: Arc<CounterCache>,
    oplog: OperationLog,
    gate_timeout: Option<Duration>,
}

impl SequenceAllocator {
    pub fn new(db: Database, oplog: OperationLog, gate_timeout: Option<Duration>) -> Self {
        SequenceAllocator {
            db,
            gate: ConcurrencyGate::new(),
            cache: Arc::new(CounterCache::default()),
            oplog,
            gate_timeout,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn cache(&self) -> &CounterCache {
        &self.cache
    }

    /// Gate wait applied when a call does not bring its own.
    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gate_timeout
    }

    /// Allocates the next number of `key`.
    ///
    /// ## Errors
    /// - `UnknownSeries`: no active counter
    /// - `SequenceExhausted`: `current > max`; counter untouched
    /// - `GateTimeout`: gave up while queued; store never touched
    /// - `Storage`: transaction rolled back
    pub async fn allocate(&self, key: &SeriesKey, actor: &str) -> LedgerResult<Allocation> {
        self.allocate_within(key, actor, self.gate_timeout).await
    }

    /// [`allocate`](Self::allocate) with its own gate wait. `None` waits
    /// for as long as it takes.
    pub async fn allocate_within(
        &self,
        key: &SeriesKey,
        actor: &str,
        timeout: Option<Duration>,
    ) -> LedgerResult<Allocation> {
        validate_series(&key.series)?;
        validate_actor(actor)?;

        let this = self.clone();
        let owned_key = key.clone();
        let owned_actor = actor.to_string();

        self.exclusive(key, actor, timeout, move || async move {
            this.allocate_locked(&owned_key, &owned_actor).await
        })
        .await
    }

    async fn allocate_locked(&self, key: &SeriesKey, actor: &str) -> LedgerResult<Allocation> {
        let result = async {
            let mut tx = self.db.begin().await?;
            let counter = take_next(&mut tx, key).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(counter)
        }
        .await;

        match result {
            Ok(counter) => {
                let number = counter.current_value;
                let allocation = Allocation {
                    document_type: key.document_type,
                    series: key.series.clone(),
                    number,
                    formatted_number: counter.format().format(&key.series, number),
                    allocated_at: Utc::now(),
                    terminal_origin: self.oplog.terminal_id().to_string(),
                };

                self.committed(key).await;
                self.record_allocation(key, &counter, &allocation.formatted_number, actor)
                    .await;

                info!(
                    series = %key,
                    number,
                    formatted_number = %allocation.formatted_number,
                    "Folio allocated"
                );
                Ok(allocation)
            }
            Err(err) => {
                self.failed(Some(key), actor, &err).await;
                Err(err)
            }
        }
    }

    /// Runs `work` while holding the gate for `key`, waiting at most
    /// `timeout` for it.
    ///
    /// The gate wait happens on the caller's task and is the only
    /// cancellable stage. `work` runs on its own task holding the permit, so
    /// an open transaction always reaches commit or rollback.
    pub(crate) async fn exclusive<T, F, Fut>(
        &self,
        key: &SeriesKey,
        actor: &str,
        timeout: Option<Duration>,
        work: F,
    ) -> LedgerResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LedgerResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = match self.gate.acquire(key, timeout).await {
            Ok(permit) => permit,
            Err(e) => {
                let err = LedgerError::from(e);
                self.oplog.record_failure(Some(key), actor, &err).await;
                return Err(err);
            }
        };

        let handle = tokio::spawn(async move {
            let _permit = permit;
            work().await
        });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let err = LedgerError::from(join_err);
                error!(series = %key, error = %err, "Allocation task did not complete");
                self.failed(Some(key), actor, &err).await;
                Err(err)
            }
        }
    }

    /// Refreshes the cached counter after a commit.
    pub(crate) async fn committed(&self, key: &SeriesKey) {
        match self.db.counters().get(key).await {
            Ok(Some(counter)) => self.cache.put(counter),
            Ok(None) => self.cache.invalidate(key),
            Err(e) => {
                warn!(series = %key, error = %e, "Could not refresh counter cache");
                self.cache.invalidate(key);
            }
        }
    }

    /// Discards cached state and records a failed call.
    pub(crate) async fn failed(&self, key: Option<&SeriesKey>, actor: &str, err: &LedgerError) {
        if let Some(key) = key {
            self.cache.invalidate(key);
        }
        debug!(error = %err, code = err.code(), "Allocation path failed");
        self.oplog.record_failure(key, actor, err).await;
    }

    /// Writes the `allocate` record for a committed allocation.
    pub(crate) async fn record_allocation(
        &self,
        key: &SeriesKey,
        before: &SequenceCounter,
        formatted_number: &str,
        actor: &str,
    ) {
        let record = self
            .oplog
            .entry(
                OperationKind::Allocate,
                actor,
                format!("allocated {formatted_number}"),
            )
            .for_series(key)
            .with_numbers(before.last_allocated(), Some(before.current_value));
        self.oplog.record(record).await;
    }

    /// Reads a counter through the cache.
    pub async fn counter(&self, key: &SeriesKey) -> LedgerResult<Option<SequenceCounter>> {
        if let Some(counter) = self.cache.get(key) {
            return Ok(Some(counter));
        }

        let counter = self.db.counters().get(key).await?;
        if let Some(ref c) = counter {
            self.cache.put(c.clone());
        }
        Ok(counter)
    }
}
