//! A fake, in-process [`StoreAdapter`] plus a conformance test suite runnable
//! against any implementation. Mirrors the teacher workspace's
//! `acteon_state::testing` conformance harness: backend crates call these
//! functions from their own test modules to prove they satisfy the same
//! contract `dlock-core`'s unit tests rely on.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::store::{StoreAdapter, TransactionDecision, TransactionOutcome, TtlReading, WatchedState, WriteOp};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Single-process, mutex-guarded [`StoreAdapter`] for unit and property
/// tests. Every `transaction` call holds the map lock for its whole
/// duration, so in this fake a watched transaction can never observe a
/// concurrent change and [`TransactionOutcome::Aborted`] never occurs —
/// which is a conservative (if extreme) way to satisfy the same
/// linearizability contract a real watched transaction provides.
#[derive(Default)]
pub struct FakeStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: seed a raw value directly, bypassing the protocol.
    pub async fn seed(&self, key: &str, value: &[u8], expiry: Option<Duration>) {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: expiry.map(|d| Instant::now() + d),
            },
        );
    }

    /// Test helper: read the raw stored bytes, if any (ignores expiry).
    pub async fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().expect("fake store mutex poisoned");
        entries.get(key).map(|e| e.value.clone())
    }

    /// Test helper: remaining ttl in whole seconds, if the key carries one.
    pub async fn ttl_seconds(&self, key: &str) -> Option<u64> {
        match self.ttl(key).await.ok()? {
            TtlReading::Seconds(secs) => Some(secs),
            TtlReading::NoExpiry | TtlReading::NoKey => None,
        }
    }

    fn remove_if_expired(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl StoreAdapter for FakeStore {
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Option<Duration>,
        only_if_absent: bool,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        Self::remove_if_expired(&mut entries, key);

        if only_if_absent && entries.contains_key(key) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: expiry.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        Self::remove_if_expired(&mut entries, key);
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        Self::remove_if_expired(&mut entries, key);
        Ok(u64::from(entries.remove(key).is_some()))
    }

    async fn ttl(&self, key: &str) -> Result<TtlReading, StoreError> {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        Self::remove_if_expired(&mut entries, key);
        Ok(match entries.get(key) {
            None => TtlReading::NoKey,
            Some(Entry {
                expires_at: None, ..
            }) => TtlReading::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => TtlReading::Seconds(at.saturating_duration_since(Instant::now()).as_secs()),
        })
    }

    async fn transaction(
        &self,
        key: &str,
        body: Box<dyn FnOnce(WatchedState) -> TransactionDecision + Send>,
    ) -> Result<TransactionOutcome, StoreError> {
        let mut entries = self.entries.lock().expect("fake store mutex poisoned");
        Self::remove_if_expired(&mut entries, key);

        let value = entries.get(key).map(|e| e.value.clone());
        let ttl = match entries.get(key) {
            None => TtlReading::NoKey,
            Some(Entry {
                expires_at: None, ..
            }) => TtlReading::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => TtlReading::Seconds(at.saturating_duration_since(Instant::now()).as_secs()),
        };

        let decision = body(WatchedState { value, ttl });
        match &decision.op {
            WriteOp::Set(bytes) => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: bytes.clone(),
                        expires_at: decision.expiry.map(|d| Instant::now() + d),
                    },
                );
            }
            WriteOp::Delete => {
                entries.remove(key);
            }
            WriteOp::None => {}
        }
        Ok(TransactionOutcome::Committed(decision.op))
    }
}

/// Run the store-level conformance suite against any [`StoreAdapter`].
/// Backend crates (`dlock-redis`, `dlock-memory`) call this from their own
/// test modules with a fresh store instance.
pub async fn run_store_conformance(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    test_set_if_absent(store).await?;
    test_get_missing(store).await?;
    test_delete(store).await?;
    test_ttl_reports_no_key(store).await?;
    Ok(())
}

async fn test_set_if_absent(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:set-if-absent";
    assert!(store.set(key, b"v1", None, true).await?, "first set should create");
    assert!(
        !store.set(key, b"v2", None, true).await?,
        "second only_if_absent set should be rejected"
    );
    assert_eq!(store.get(key).await?.as_deref(), Some(&b"v1"[..]));
    Ok(())
}

async fn test_get_missing(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    assert!(store.get("conformance:missing").await?.is_none());
    Ok(())
}

async fn test_delete(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    let key = "conformance:delete";
    store.set(key, b"v", None, false).await?;
    assert_eq!(store.delete(key).await?, 1);
    assert_eq!(store.delete(key).await?, 0);
    Ok(())
}

async fn test_ttl_reports_no_key(store: &dyn StoreAdapter) -> Result<(), StoreError> {
    assert_eq!(store.ttl("conformance:no-such-key").await?, TtlReading::NoKey);
    Ok(())
}
