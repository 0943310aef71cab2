//! In-memory [`StoreAdapter`] backend, for single-process use and as the
//! backend `dlock-core`'s own test suite exercises through the conformance
//! harness. Grounded on the teacher workspace's `MemoryDistributedLock`
//! (a `DashMap`-backed lock with lazy expiry), generalized here from "whole
//! lock manager" down to the narrower key-value contract `dlock-core`
//! actually needs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use tokio::time::Instant;

use dlock_core::{StoreAdapter, StoreError, TransactionDecision, TransactionOutcome, TtlReading, WatchedState, WriteOp};

#[derive(Clone)]
struct Record {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn ttl(&self) -> TtlReading {
        match self.expires_at {
            None => TtlReading::NoExpiry,
            Some(at) => TtlReading::Seconds(at.saturating_duration_since(Instant::now()).as_secs()),
        }
    }
}

/// `DashMap`-backed [`StoreAdapter`]. Expiry is lazy: an expired entry is
/// evicted the next time its key is touched, not on a background timer.
///
/// [`StoreAdapter::transaction`] holds the target key's `DashMap` shard lock
/// for the whole call, so a watched transaction here never actually
/// observes a concurrent change — [`TransactionOutcome::Aborted`] is never
/// returned, the same conservative stance `dlock-core`'s own `FakeStore`
/// test double takes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>, only_if_absent: bool) -> Result<bool, StoreError> {
        self.entries.remove_if(key, |_, r| r.is_expired());

        match self.entries.entry(key.to_string()) {
            DashEntry::Occupied(_) if only_if_absent => Ok(false),
            DashEntry::Occupied(mut occupied) => {
                occupied.insert(Record {
                    value: value.to_vec(),
                    expires_at: expiry.map(|d| Instant::now() + d),
                });
                Ok(true)
            }
            DashEntry::Vacant(vacant) => {
                vacant.insert(Record {
                    value: value.to_vec(),
                    expires_at: expiry.map(|d| Instant::now() + d),
                });
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.entries.remove_if(key, |_, r| r.is_expired());
        Ok(self.entries.get(key).map(|r| r.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        self.entries.remove_if(key, |_, r| r.is_expired());
        Ok(u64::from(self.entries.remove(key).is_some()))
    }

    async fn ttl(&self, key: &str) -> Result<TtlReading, StoreError> {
        self.entries.remove_if(key, |_, r| r.is_expired());
        Ok(self.entries.get(key).map_or(TtlReading::NoKey, |r| r.ttl()))
    }

    async fn transaction(
        &self,
        key: &str,
        body: Box<dyn FnOnce(WatchedState) -> TransactionDecision + Send>,
    ) -> Result<TransactionOutcome, StoreError> {
        self.entries.remove_if(key, |_, r| r.is_expired());

        let outcome = match self.entries.entry(key.to_string()) {
            DashEntry::Occupied(mut occupied) => {
                let state = WatchedState {
                    value: Some(occupied.get().value.clone()),
                    ttl: occupied.get().ttl(),
                };
                let decision = body(state);
                match decision.op {
                    WriteOp::Set(bytes) => {
                        occupied.insert(Record {
                            value: bytes.clone(),
                            expires_at: decision.expiry.map(|d| Instant::now() + d),
                        });
                        TransactionOutcome::Committed(WriteOp::Set(bytes))
                    }
                    WriteOp::Delete => {
                        occupied.remove();
                        TransactionOutcome::Committed(WriteOp::Delete)
                    }
                    WriteOp::None => TransactionOutcome::Committed(WriteOp::None),
                }
            }
            DashEntry::Vacant(vacant) => {
                let decision = body(WatchedState {
                    value: None,
                    ttl: TtlReading::NoKey,
                });
                match decision.op {
                    WriteOp::Set(bytes) => {
                        vacant.insert(Record {
                            value: bytes.clone(),
                            expires_at: decision.expiry.map(|d| Instant::now() + d),
                        });
                        TransactionOutcome::Committed(WriteOp::Set(bytes))
                    }
                    WriteOp::Delete | WriteOp::None => TransactionOutcome::Committed(decision.op),
                }
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dlock_core::handle::LockOptions;
    use dlock_core::testing::run_store_conformance;
    use dlock_core::{ExclusiveLock, SharedLock, StoreAdapter, UNBOUNDED};

    use super::*;

    #[tokio::test]
    async fn satisfies_store_conformance() {
        let store = MemoryStore::new();
        run_store_conformance(&store).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lock_expires_after_ttl() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let options = LockOptions::default().with_ttl(Duration::from_secs(5));

        let first = ExclusiveLock::new(store.clone(), "res", options.clone());
        assert!(first.acquire(false, UNBOUNDED).await.unwrap());

        let second = ExclusiveLock::new(store, "res", options);
        assert!(!second.acquire(false, UNBOUNDED).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(second.acquire(false, UNBOUNDED).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_until_released() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let holder = ExclusiveLock::new(store.clone(), "res", LockOptions::default());
        assert!(holder.acquire(false, UNBOUNDED).await.unwrap());

        let contender = ExclusiveLock::new(store, "res", LockOptions::default());
        let waiter = tokio::spawn(async move { contender.acquire(true, UNBOUNDED).await });

        tokio::time::sleep(Duration::from_secs(2)).await;
        holder.release(false).await.unwrap();

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_timeout_reports_failure() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let holder = ExclusiveLock::new(store.clone(), "res", LockOptions::default());
        assert!(holder.acquire(false, UNBOUNDED).await.unwrap());

        let contender = ExclusiveLock::new(store, "res", LockOptions::default());
        assert!(!contender.acquire(true, 3).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_shared_and_exclusive_contention() {
        let store: Arc<dyn StoreAdapter> = Arc::new(MemoryStore::new());
        let reader_a = SharedLock::new(store.clone(), "res", LockOptions::default());
        let reader_b = SharedLock::new(store.clone(), "res", LockOptions::default());
        let writer = ExclusiveLock::new(store, "res", LockOptions::default());

        assert!(reader_a.acquire(false, UNBOUNDED).await.unwrap());
        assert!(reader_b.acquire(false, UNBOUNDED).await.unwrap());
        assert!(!writer.acquire(false, UNBOUNDED).await.unwrap());

        reader_a.release(false).await.unwrap();
        reader_b.release(false).await.unwrap();
        assert!(writer.acquire(false, UNBOUNDED).await.unwrap());
    }
}
