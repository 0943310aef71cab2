use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use dlock_core::{StoreAdapter, StoreError, TransactionDecision, TransactionOutcome, TtlReading, WatchedState, WriteOp};

use crate::config::RedisStoreConfig;

fn backend_err(e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::new(e)
}

fn duration_to_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Convert a Redis `PTTL` reply (-2 no key, -1 no expiry, else milliseconds)
/// into a [`TtlReading`].
fn ttl_reading_from_pttl(ms: i64) -> TtlReading {
    match ms {
        -2 => TtlReading::NoKey,
        -1 => TtlReading::NoExpiry,
        ms => TtlReading::Seconds(u64::try_from(ms.max(0)).unwrap_or(0).div_ceil(1000)),
    }
}

/// Redis-backed [`StoreAdapter`].
///
/// `set`/`get`/`delete`/`ttl` map onto the corresponding native Redis
/// commands (`SET ... NX PX`, `GET`, `DEL`, `PTTL`), all individually atomic
/// at the server. [`transaction`](StoreAdapter::transaction) is built on
/// native `WATCH`/`MULTI`/`EXEC`: the watch and the read happen outside any
/// pipeline, the synchronous `body` closure decides the write against that
/// snapshot, and the write is submitted inside an `atomic()` pipeline whose
/// `EXEC` silently returns nothing if `key` changed after the `WATCH` —
/// exactly the signal [`TransactionOutcome::Aborted`] models.
///
/// # Safety Warning
///
/// Like any single-instance Redis lock, this provides full mutual exclusion
/// only against a standalone Redis instance. Under Redis Cluster or Sentinel
/// failover, asynchronous replication can let a promoted replica forget an
/// in-flight lock key, breaking mutual exclusion across that failover
/// window. This crate does not implement Redlock-style quorum acquisition.
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build a `RedisStore` from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the connection pool cannot be built.
    pub fn new(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(config.effective_url());
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(backend_err)?
            .map_err(backend_err)?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool.get().await.map_err(backend_err)
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn set(&self, key: &str, value: &[u8], expiry: Option<Duration>, only_if_absent: bool) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if only_if_absent {
            cmd.arg("NX");
        }
        if let Some(ttl) = expiry {
            cmd.arg("PX").arg(duration_to_ms(ttl));
        }

        let reply: redis::Value = cmd.query_async(&mut conn).await.map_err(backend_err)?;
        Ok(!matches!(reply, redis::Value::Nil))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        conn.del(key).await.map_err(backend_err)
    }

    async fn ttl(&self, key: &str) -> Result<TtlReading, StoreError> {
        let mut conn = self.conn().await?;
        let ms: i64 = conn.pttl(key).await.map_err(backend_err)?;
        Ok(ttl_reading_from_pttl(ms))
    }

    async fn transaction(
        &self,
        key: &str,
        body: Box<dyn FnOnce(WatchedState) -> TransactionDecision + Send>,
    ) -> Result<TransactionOutcome, StoreError> {
        let mut conn = self.conn().await?;

        redis::cmd("WATCH").arg(key).query_async::<()>(&mut conn).await.map_err(backend_err)?;

        let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend_err)?;
        let ttl_ms: i64 = conn.pttl(key).await.map_err(backend_err)?;
        let ttl = ttl_reading_from_pttl(ttl_ms);

        let decision = body(WatchedState { value, ttl });

        let mut pipe = redis::pipe();
        pipe.atomic();
        match &decision.op {
            WriteOp::Set(bytes) => {
                if let Some(expiry) = decision.expiry {
                    pipe.cmd("SET").arg(key).arg(bytes.as_slice()).arg("PX").arg(duration_to_ms(expiry));
                } else {
                    pipe.cmd("SET").arg(key).arg(bytes.as_slice());
                }
            }
            WriteOp::Delete => {
                pipe.cmd("DEL").arg(key);
            }
            WriteOp::None => {
                // Nothing to write, but EXEC must still run so a changed
                // watch is detected the same way as a real write would be.
                pipe.cmd("PING");
            }
        }

        let committed: Option<Vec<redis::Value>> = pipe.query_async(&mut conn).await.map_err(backend_err)?;

        Ok(match committed {
            Some(_) => TransactionOutcome::Committed(decision.op),
            None => TransactionOutcome::Aborted,
        })
    }
}
