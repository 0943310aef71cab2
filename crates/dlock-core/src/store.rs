use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Remaining time-to-live reported by [`StoreAdapter::ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlReading {
    /// The key exists and expires in this many seconds.
    Seconds(u64),
    /// The key exists but carries no expiry.
    NoExpiry,
    /// The key does not exist.
    NoKey,
}

/// The write half of a watched transaction, decided by the transaction body
/// after inspecting the value observed at watch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Replace the key's value with these bytes (and the accompanying
    /// expiry).
    Set(Vec<u8>),
    /// Delete the key.
    Delete,
    /// Apply no write. The transaction still reports [`TransactionOutcome::Committed`]
    /// so callers can distinguish "ran cleanly, nothing to do" (e.g. the
    /// record was not in a state this caller is allowed to touch) from
    /// [`TransactionOutcome::Aborted`] (the watched key changed mid-flight
    /// and nothing was even evaluated against current data).
    None,
}

/// What a transaction body decided to write, and under what expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDecision {
    pub op: WriteOp,
    pub expiry: Option<Duration>,
}

impl TransactionDecision {
    pub fn no_op() -> Self {
        Self {
            op: WriteOp::None,
            expiry: None,
        }
    }

    pub fn set(value: Vec<u8>, expiry: Option<Duration>) -> Self {
        Self {
            op: WriteOp::Set(value),
            expiry,
        }
    }

    pub fn delete() -> Self {
        Self {
            op: WriteOp::Delete,
            expiry: None,
        }
    }
}

/// Outcome of a [`StoreAdapter::transaction`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction body ran against a consistent snapshot and its
    /// decision was committed (which may itself be a no-op write).
    Committed(WriteOp),
    /// The watched key changed between the watch and the commit attempt; no
    /// write was applied and the body's decision was discarded. Callers are
    /// expected to retry from scratch.
    Aborted,
}

/// The state observed when a watched transaction began, handed to the
/// transaction body. `ttl` is read eagerly alongside the value so bodies
/// that need to preserve an existing expiry (shared-lock partial release,
/// spec step "query the key's remaining ttl") don't need a second round
/// trip outside the watch window.
#[derive(Debug, Clone)]
pub struct WatchedState {
    pub value: Option<Vec<u8>>,
    pub ttl: TtlReading,
}

/// Narrow key-value capability the lock protocol is built on.
///
/// This is the only interface `dlock-core` requires of a backing store. The
/// concrete client (connection pooling, socket I/O, authentication) lives in
/// backend crates such as `dlock-redis`; `dlock-memory` provides a fake for
/// tests.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Atomically set `key` to `value`. If `only_if_absent` is true, the set
    /// only happens when the key does not currently exist. Returns whether
    /// the key was (newly) created by this call.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Option<Duration>,
        only_if_absent: bool,
    ) -> Result<bool, StoreError>;

    /// Read the current value of `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete `key`. Returns the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Query the remaining ttl of `key`.
    async fn ttl(&self, key: &str) -> Result<TtlReading, StoreError>;

    /// Watch `key`, run `body` against the value observed at watch time, and
    /// atomically commit whatever `body` decides to write — unless `key`
    /// changed between the watch and the commit attempt, in which case the
    /// whole call reports [`TransactionOutcome::Aborted`] and applies no
    /// write at all.
    async fn transaction(
        &self,
        key: &str,
        body: Box<dyn FnOnce(WatchedState) -> TransactionDecision + Send>,
    ) -> Result<TransactionOutcome, StoreError>;
}
