use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::acquire::{acquire, acquire_cancellable, UNBOUNDED};
use crate::engine::{ExclusiveLockEngine, LockEngine, SharedLockEngine};
use crate::error::LockError;
use crate::record::build_lock_key;
use crate::store::StoreAdapter;

/// Shared configuration for either lock flavor: where the key lives and how
/// long a held lock survives without being refreshed.
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    pub prefix: Option<String>,
    pub ttl: Option<Duration>,
}

impl LockOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Generic core behind [`ExclusiveLock`] and [`SharedLock`]: the acquisition
/// loop, the release algorithm, and the `{class, address, prefix, name, ttl,
/// secret}` rendering are all written once here against the [`LockEngine`]
/// trait, and both public lock types are thin wrappers naming a concrete
/// engine.
pub struct Handle<E: LockEngine> {
    engine: E,
    class: &'static str,
    store_id: usize,
    prefix: Option<String>,
    name: String,
    ttl: Option<Duration>,
    secret: String,
}

impl<E: LockEngine> Handle<E> {
    fn new(
        engine: E,
        class: &'static str,
        store_id: usize,
        prefix: Option<String>,
        name: String,
        ttl: Option<Duration>,
        secret: String,
    ) -> Self {
        Self {
            engine,
            class,
            store_id,
            prefix,
            name,
            ttl,
            secret,
        }
    }

    /// The per-acquisition owner token. Exposed so callers can persist it
    /// (e.g. across process restarts) and later reconstruct a handle that
    /// can still release the same lock.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Run the Acquisition Loop (blocking retries every second, or a single
    /// attempt when `blocking` is false). `timeout_secs <= 0` waits
    /// unboundedly; see [`crate::acquire::acquire`] for the exact contract.
    pub async fn acquire(&self, blocking: bool, timeout_secs: i64) -> Result<bool, LockError> {
        Ok(acquire(&self.engine, blocking, timeout_secs).await?)
    }

    /// Same as [`Handle::acquire`] but returns early once `cancel` is
    /// tripped.
    pub async fn acquire_cancellable(
        &self,
        blocking: bool,
        timeout_secs: i64,
        cancel: &CancellationToken,
    ) -> Result<bool, LockError> {
        Ok(acquire_cancellable(&self.engine, blocking, timeout_secs, cancel).await?)
    }

    /// Release this handle's ownership.
    ///
    /// When `force` is false: the secret must currently own the record
    /// ([`LockError::NotOwner`] otherwise), and the subsequent delete must
    /// actually remove something ([`LockError::LostLock`] if the record
    /// vanished between the check and the delete — expired, or force-released
    /// by someone else).
    ///
    /// When `force` is true: the ownership check is skipped, but the delete
    /// must still remove something ([`LockError::LostLock`] otherwise) — force
    /// only bypasses *whose* secret is required, not the "did this actually
    /// free the lock" signal.
    pub async fn release(&self, force: bool) -> Result<(), LockError> {
        if !force && !self.engine.verify_owner().await? {
            return Err(LockError::NotOwner);
        }

        let removed = self.engine.delete().await?;
        if !removed {
            return Err(LockError::LostLock);
        }

        Ok(())
    }
}

impl<E: LockEngine + Send + Sync + 'static> Handle<E> {
    /// Acquire (blocking, unbounded wait) and wrap the result in a
    /// [`Guard`] that releases on drop.
    pub async fn acquire_scoped(self: Arc<Self>) -> Result<Guard<E>, LockError> {
        if !self.acquire(true, UNBOUNDED).await? {
            return Err(LockError::LostLock);
        }
        Ok(Guard { handle: Some(self) })
    }
}

impl<E: LockEngine> fmt::Debug for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class)
            .field("address", &format_args!("{:#x}", self.store_id))
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("secret", &self.secret)
            .finish()
    }
}

impl<E: LockEngine> fmt::Display for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} at {:#x}: prefix={}, name={}, ttl={}, secret={}>",
            self.class,
            self.store_id,
            self.prefix.as_deref().unwrap_or("-"),
            self.name,
            self.ttl.map_or_else(|| "none".to_string(), |d| format!("{}s", d.as_secs())),
            self.secret,
        )
    }
}

/// RAII guard returned by [`Handle::acquire_scoped`]. Releases its handle's
/// ownership on drop, best effort: drop cannot run async code, so the
/// release is spawned as a detached task and a failure is only logged, never
/// propagated.
pub struct Guard<E: LockEngine + Send + Sync + 'static> {
    handle: Option<Arc<Handle<E>>>,
}

impl<E: LockEngine + Send + Sync + 'static> Drop for Guard<E> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = handle.release(false).await {
                warn!(lock = %handle, error = %err, "scoped lock guard failed to release on drop");
            }
        });
    }
}

fn store_identity(store: &Arc<dyn StoreAdapter>) -> usize {
    Arc::as_ptr(store) as *const () as usize
}

/// Exclusive (single-writer) distributed lock.
pub struct ExclusiveLock(Handle<ExclusiveLockEngine>);

impl ExclusiveLock {
    pub fn new(store: Arc<dyn StoreAdapter>, name: impl Into<String>, options: LockOptions) -> Self {
        let name = name.into();
        let key = build_lock_key(options.prefix.as_deref(), &name);
        let secret = Uuid::new_v4().to_string();
        let store_id = store_identity(&store);
        let engine = ExclusiveLockEngine::new(store, key, options.ttl, secret.clone());
        Self(Handle::new(
            engine,
            "ExclusiveLock",
            store_id,
            options.prefix,
            name,
            options.ttl,
            secret,
        ))
    }
}

impl std::ops::Deref for ExclusiveLock {
    type Target = Handle<ExclusiveLockEngine>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ExclusiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Shared (multi-reader) distributed lock.
pub struct SharedLock(Handle<SharedLockEngine>);

impl SharedLock {
    pub fn new(store: Arc<dyn StoreAdapter>, name: impl Into<String>, options: LockOptions) -> Self {
        let name = name.into();
        let key = build_lock_key(options.prefix.as_deref(), &name);
        let secret = Uuid::new_v4().to_string();
        let store_id = store_identity(&store);
        let engine = SharedLockEngine::new(store, key, options.ttl, secret.clone());
        Self(Handle::new(
            engine,
            "SharedLock",
            store_id,
            options.prefix,
            name,
            options.ttl,
            secret,
        ))
    }
}

impl std::ops::Deref for SharedLock {
    type Target = Handle<SharedLockEngine>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for SharedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SharedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn store() -> Arc<dyn StoreAdapter> {
        Arc::new(FakeStore::new())
    }

    #[tokio::test]
    async fn exclusive_acquire_then_release() {
        let lock = ExclusiveLock::new(store(), "res", LockOptions::default());
        assert!(lock.acquire(false, UNBOUNDED).await.unwrap());
        lock.release(false).await.unwrap();
    }

    #[tokio::test]
    async fn release_without_owning_is_not_owner() {
        let lock = ExclusiveLock::new(store(), "res", LockOptions::default());
        let err = lock.release(false).await.unwrap_err();
        assert!(matches!(err, LockError::NotOwner));
    }

    #[tokio::test]
    async fn second_release_after_force_is_lost_lock() {
        let shared_store = store();
        let a = ExclusiveLock::new(shared_store.clone(), "res", LockOptions::default());
        let b = ExclusiveLock::new(shared_store, "res", LockOptions::default());

        assert!(a.acquire(false, UNBOUNDED).await.unwrap());
        b.release(true).await.unwrap();

        let err = a.release(false).await.unwrap_err();
        assert!(matches!(err, LockError::LostLock));
    }

    #[tokio::test]
    async fn second_force_release_on_empty_lock_is_lost_lock() {
        let lock = ExclusiveLock::new(store(), "res", LockOptions::default());
        assert!(lock.acquire(false, UNBOUNDED).await.unwrap());
        lock.release(true).await.unwrap();

        let err = lock.release(true).await.unwrap_err();
        assert!(matches!(err, LockError::LostLock));
    }

    #[tokio::test]
    async fn debug_rendering_includes_identity_fields() {
        let lock = ExclusiveLock::new(store(), "res", LockOptions::default().with_prefix("UT"));
        let rendered = format!("{lock:?}");
        assert!(rendered.contains("ExclusiveLock"));
        assert!(rendered.contains("UT"));
        assert!(rendered.contains("res"));
    }

    #[tokio::test]
    async fn scoped_guard_releases_on_drop() {
        let shared_store = store();
        let handle = Arc::new(Handle::new(
            ExclusiveLockEngine::new(shared_store.clone(), "lock:scoped".into(), None, "S".into()),
            "ExclusiveLock",
            store_identity(&shared_store),
            None,
            "scoped".into(),
            None,
            "S".into(),
        ));

        let guard = handle.clone().acquire_scoped().await.unwrap();
        drop(guard);

        tokio::task::yield_now().await;

        let other = Handle::new(
            ExclusiveLockEngine::new(shared_store, "lock:scoped".into(), None, "T".into()),
            "ExclusiveLock",
            0,
            None,
            "scoped".into(),
            None,
            "T".into(),
        );
        assert!(other.acquire(false, UNBOUNDED).await.unwrap());
    }
}
