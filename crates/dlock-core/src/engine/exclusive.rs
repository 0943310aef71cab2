use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::record::LockRecord;
use crate::store::StoreAdapter;
use crate::time::now_unix_seconds;

use super::LockEngine;

/// Exclusive (write) lock engine: single-owner, backed by an atomic
/// set-if-absent. Because the store's set-if-absent is linearizable, at most
/// one client's [`try_write`](LockEngine::try_write) can ever succeed for a
/// given key.
pub struct ExclusiveLockEngine {
    store: Arc<dyn StoreAdapter>,
    key: String,
    ttl: Option<Duration>,
    secret: String,
}

impl ExclusiveLockEngine {
    pub fn new(store: Arc<dyn StoreAdapter>, key: String, ttl: Option<Duration>, secret: String) -> Self {
        Self {
            store,
            key,
            ttl,
            secret,
        }
    }
}

#[async_trait]
impl LockEngine for ExclusiveLockEngine {
    async fn try_write(&self) -> Result<bool, StoreError> {
        let record = LockRecord::new_exclusive(now_unix_seconds(), self.secret.clone());
        let created = self
            .store
            .set(&self.key, &record.encode(), self.ttl, true)
            .await?;
        debug!(key = %self.key, created, "exclusive try_write");
        Ok(created)
    }

    async fn verify_owner(&self) -> Result<bool, StoreError> {
        let Some(raw) = self.store.get(&self.key).await? else {
            return Ok(false);
        };
        let Some(record) = LockRecord::decode(&raw) else {
            return Ok(false);
        };
        Ok(record.secret.contains(&self.secret))
    }

    async fn delete(&self) -> Result<bool, StoreError> {
        let removed = self.store.delete(&self.key).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn engine(store: Arc<FakeStore>, secret: &str) -> ExclusiveLockEngine {
        ExclusiveLockEngine::new(store, "lock:test".into(), None, secret.into())
    }

    #[tokio::test]
    async fn first_writer_wins() {
        let store = Arc::new(FakeStore::new());
        let a = engine(store.clone(), "A");
        let b = engine(store.clone(), "B");

        assert!(a.try_write().await.unwrap());
        assert!(!b.try_write().await.unwrap());
    }

    #[tokio::test]
    async fn verify_owner_matches_only_the_writer() {
        let store = Arc::new(FakeStore::new());
        let a = engine(store.clone(), "A");
        let b = engine(store.clone(), "B");

        assert!(a.try_write().await.unwrap());
        assert!(a.verify_owner().await.unwrap());
        assert!(!b.verify_owner().await.unwrap());
    }

    #[tokio::test]
    async fn verify_owner_false_when_absent() {
        let store = Arc::new(FakeStore::new());
        let a = engine(store, "A");
        assert!(!a.verify_owner().await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_unconditional() {
        let store = Arc::new(FakeStore::new());
        let a = engine(store.clone(), "A");
        let b = engine(store.clone(), "B");

        assert!(a.try_write().await.unwrap());
        // delete() itself performs no ownership check; that is the release
        // algorithm's job.
        assert!(b.delete().await.unwrap());
        assert!(!b.delete().await.unwrap(), "second delete finds nothing");
    }
}
