use std::fmt;

/// A transport-level failure reported by a [`StoreAdapter`](crate::store::StoreAdapter)
/// implementation (connection loss, I/O error, protocol error, ...).
///
/// `dlock-core` never constructs this itself; it only propagates whatever the
/// concrete backend crate (`dlock-redis`, `dlock-memory`, ...) reports.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub(crate) Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    /// Wrap any backend error as a [`StoreError`].
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }

    /// Build a [`StoreError`] from a plain message, for backends with no
    /// structured error type of their own.
    pub fn from_message(message: impl Into<String>) -> Self {
        #[derive(Debug)]
        struct Message(String);
        impl fmt::Display for Message {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl std::error::Error for Message {}
        Self(Box::new(Message(message.into())))
    }
}

/// Errors surfaced to callers of a [`crate::handle::Handle`].
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// `release` was called by a handle whose secret is not present in the
    /// current record: no record at all (exclusive), a record that is
    /// exclusive-typed (shared release), a secret set that doesn't contain
    /// us, or a malformed record.
    #[error("cannot release un-acquired lock")]
    NotOwner,

    /// Ownership was confirmed but the subsequent delete found nothing to
    /// remove, or the record changed to an unusable state between the
    /// ownership check and the delete. The lock had already expired or been
    /// force-released by someone else.
    #[error("release unlocked lock")]
    LostLock,

    /// The store adapter itself failed (connection, I/O, protocol).
    #[error("store transport error: {0}")]
    Transport(#[from] StoreError),
}
