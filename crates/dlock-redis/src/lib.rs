//! Redis-backed [`StoreAdapter`](dlock_core::StoreAdapter) for `dlock-core`.
//!
//! See the [module-level documentation](store) for the guarantees this
//! backend does and does not provide.

pub mod config;
pub mod store;

pub use config::RedisStoreConfig;
pub use store::RedisStore;
