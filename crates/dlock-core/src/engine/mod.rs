pub mod exclusive;
pub mod shared;

use async_trait::async_trait;

use crate::error::StoreError;

pub use exclusive::ExclusiveLockEngine;
pub use shared::SharedLockEngine;

/// The capability both lock flavors implement over a
/// [`StoreAdapter`](crate::store::StoreAdapter). The Acquisition Loop and the
/// Lock Handle depend only on this trait, never on the concrete exclusive or
/// shared engine types.
#[async_trait]
pub trait LockEngine: Send + Sync {
    /// Attempt a single, non-blocking write that acquires (or joins, for
    /// shared locks) the lock for this engine's secret. Returns whether the
    /// attempt succeeded.
    async fn try_write(&self) -> Result<bool, StoreError>;

    /// Check whether this engine's secret currently owns the lock.
    async fn verify_owner(&self) -> Result<bool, StoreError>;

    /// Remove this engine's ownership from the record (or the whole record,
    /// if it was the only/last owner). Returns whether anything was
    /// actually removed.
    async fn delete(&self) -> Result<bool, StoreError>;
}
