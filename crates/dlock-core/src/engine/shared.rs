use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::StoreError;
use crate::record::LockRecord;
use crate::store::{StoreAdapter, TransactionDecision, TransactionOutcome, TtlReading, WriteOp};
use crate::time::now_unix_seconds;

use super::LockEngine;

/// Shared (read) lock engine: any number of holders may coexist, but the key
/// is a set-valued record mutated through read-modify-write transactions
/// rather than a single atomic set-if-absent.
pub struct SharedLockEngine {
    store: Arc<dyn StoreAdapter>,
    key: String,
    ttl: Option<Duration>,
    secret: String,
    max_retries: Option<u32>,
}

impl SharedLockEngine {
    pub fn new(store: Arc<dyn StoreAdapter>, key: String, ttl: Option<Duration>, secret: String) -> Self {
        Self {
            store,
            key,
            ttl,
            secret,
            max_retries: None,
        }
    }

    /// Bound the number of watched-transaction retries `try_write`/`delete`
    /// will attempt on a changed watch before giving up with an error.
    /// Default is unbounded, matching the original implementation's
    /// compare-and-swap retry loop.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn retry_limit_exceeded(&self, attempt: u32) -> Option<StoreError> {
        let max = self.max_retries?;
        (attempt > max).then(|| {
            StoreError::from_message(format!(
                "shared lock transaction retry limit ({max}) exceeded for key {}",
                self.key
            ))
        })
    }
}

#[async_trait]
impl LockEngine for SharedLockEngine {
    async fn try_write(&self) -> Result<bool, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            let secret = self.secret.clone();
            let now = now_unix_seconds();
            let ttl = self.ttl;

            let outcome = self
                .store
                .transaction(
                    &self.key,
                    Box::new(move |state| {
                        let record = match state.value {
                            None => LockRecord::new_shared(now, secret.clone()),
                            Some(bytes) => {
                                let Some(mut record) = LockRecord::decode(&bytes) else {
                                    return TransactionDecision::no_op();
                                };
                                if !record.is_valid_shared() {
                                    return TransactionDecision::no_op();
                                }
                                let set = record.shared_secrets_mut();
                                if !set.iter().any(|s| s == &secret) {
                                    set.push(secret.clone());
                                }
                                record.timestamp = now;
                                record
                            }
                        };
                        TransactionDecision::set(record.encode(), ttl)
                    }),
                )
                .await?;

            match outcome {
                TransactionOutcome::Committed(WriteOp::Set(_)) => return Ok(true),
                TransactionOutcome::Committed(_) => return Ok(false),
                TransactionOutcome::Aborted => {
                    attempt += 1;
                    if let Some(err) = self.retry_limit_exceeded(attempt) {
                        return Err(err);
                    }
                    info!(key = %self.key, attempt, "watched key changed, retrying shared acquire");
                }
            }
        }
    }

    async fn verify_owner(&self) -> Result<bool, StoreError> {
        let Some(raw) = self.store.get(&self.key).await? else {
            return Ok(false);
        };
        let Some(record) = LockRecord::decode(&raw) else {
            return Ok(false);
        };
        if !record.is_valid_shared() {
            return Ok(false);
        }
        Ok(record.secret.contains(&self.secret))
    }

    async fn delete(&self) -> Result<bool, StoreError> {
        let mut attempt: u32 = 0;
        loop {
            let secret = self.secret.clone();

            let outcome = self
                .store
                .transaction(
                    &self.key,
                    Box::new(move |state| {
                        let Some(bytes) = state.value else {
                            return TransactionDecision::no_op();
                        };
                        let Some(mut record) = LockRecord::decode(&bytes) else {
                            return TransactionDecision::no_op();
                        };
                        if !record.is_valid_shared() {
                            return TransactionDecision::no_op();
                        }
                        {
                            let set = record.shared_secrets_mut();
                            if !set.iter().any(|s| s == &secret) {
                                return TransactionDecision::no_op();
                            }
                            set.retain(|s| s != &secret);
                        }
                        if record.shared_secrets_mut().is_empty() {
                            TransactionDecision::delete()
                        } else {
                            // Ttl is preserved from what was queried at watch
                            // time, never refreshed — a releasing holder must
                            // not extend the lifetime of the readers left
                            // behind.
                            let preserved_ttl = match state.ttl {
                                TtlReading::Seconds(secs) => Some(Duration::from_secs(secs)),
                                TtlReading::NoExpiry | TtlReading::NoKey => None,
                            };
                            TransactionDecision::set(record.encode(), preserved_ttl)
                        }
                    }),
                )
                .await?;

            match outcome {
                TransactionOutcome::Committed(WriteOp::None) => return Ok(false),
                TransactionOutcome::Committed(_) => return Ok(true),
                TransactionOutcome::Aborted => {
                    attempt += 1;
                    if let Some(err) = self.retry_limit_exceeded(attempt) {
                        return Err(err);
                    }
                    info!(key = %self.key, attempt, "watched key changed, retrying shared release");
                }
            }
        }
    }
}
