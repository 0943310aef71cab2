use serde::{Deserialize, Serialize};

/// The value stored under a lock key.
///
/// `secret` is a single token for exclusive records and a set of tokens (one
/// per current shared holder) for shared records. Missing `exclusive` on
/// decode defaults to `true` for legacy compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub timestamp: i64,
    pub secret: Secret,
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

fn default_exclusive() -> bool {
    true
}

/// The owner token(s) carried by a [`LockRecord`].
///
/// Untagged so the wire shape matches whichever flavor wrote the record: a
/// bare string for an exclusive lock, an array of strings for a shared lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Secret {
    Single(String),
    Many(Vec<String>),
}

impl Secret {
    pub fn contains(&self, token: &str) -> bool {
        match self {
            Self::Single(s) => s == token,
            Self::Many(set) => set.iter().any(|s| s == token),
        }
    }
}

impl LockRecord {
    /// Build a fresh exclusive record for `secret` at `timestamp`.
    pub fn new_exclusive(timestamp: i64, secret: impl Into<String>) -> Self {
        Self {
            timestamp,
            secret: Secret::Single(secret.into()),
            exclusive: true,
        }
    }

    /// Build a fresh shared record holding a single initial owner.
    pub fn new_shared(timestamp: i64, secret: impl Into<String>) -> Self {
        Self {
            timestamp,
            secret: Secret::Many(vec![secret.into()]),
            exclusive: false,
        }
    }

    /// Serialize to the stable wire encoding. Unknown-on-read fields are
    /// never round-tripped because this struct models exactly the three
    /// specified fields.
    pub fn encode(&self) -> Vec<u8> {
        // A `LockRecord` only ever contains JSON-representable data, so this
        // cannot fail.
        serde_json::to_vec(self).expect("LockRecord is always representable as JSON")
    }

    /// Decode a stored value. Returns `None` on any malformed or
    /// undecodable input — callers must never auto-repair these, per the
    /// protocol's "refuse the operation as unlocked" rule.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Whether this record is a structurally valid shared (read) record:
    /// not exclusive-typed, and `secret` is a collection.
    pub fn is_valid_shared(&self) -> bool {
        !self.exclusive && matches!(self.secret, Secret::Many(_))
    }

    /// The set of secrets in a shared record. Panics if called on a record
    /// that is not [`LockRecord::is_valid_shared`]; callers must check first.
    pub fn shared_secrets_mut(&mut self) -> &mut Vec<String> {
        match &mut self.secret {
            Secret::Many(set) => set,
            Secret::Single(_) => panic!("shared_secrets_mut called on a non-shared record"),
        }
    }
}

/// Build the lock key for `name`, optionally scoped under `prefix`:
/// `"{prefix}:lock:{name}"` when a prefix is configured, otherwise
/// `"lock:{name}"`.
pub fn build_lock_key(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:lock:{name}"),
        _ => format!("lock:{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_without_prefix() {
        assert_eq!(build_lock_key(None, "TestLock"), "lock:TestLock");
    }

    #[test]
    fn key_with_prefix() {
        assert_eq!(
            build_lock_key(Some("UT"), "TestLock"),
            "UT:lock:TestLock"
        );
    }

    #[test]
    fn key_with_empty_prefix_behaves_as_no_prefix() {
        assert_eq!(build_lock_key(Some(""), "TestLock"), "lock:TestLock");
    }

    #[test]
    fn decodes_exclusive_record() {
        let raw = br#"{"timestamp":1504732028,"secret":"SecretData","exclusive":true}"#;
        let record = LockRecord::decode(raw).expect("should decode");
        assert_eq!(record.secret, Secret::Single("SecretData".into()));
        assert!(record.exclusive);
    }

    #[test]
    fn missing_exclusive_defaults_to_true() {
        let raw = br#"{"timestamp":1504732028,"secret":"QWERTY"}"#;
        let record = LockRecord::decode(raw).expect("should decode");
        assert!(record.exclusive, "absent exclusive must read as true");
    }

    #[test]
    fn decodes_shared_record() {
        let raw = br#"{"timestamp":1,"secret":["A","B"],"exclusive":false}"#;
        let record = LockRecord::decode(raw).expect("should decode");
        assert!(record.is_valid_shared());
        assert!(record.secret.contains("A"));
        assert!(record.secret.contains("B"));
        assert!(!record.secret.contains("C"));
    }

    #[test]
    fn ignores_unknown_fields_on_read() {
        let raw = br#"{"timestamp":1,"secret":"X","exclusive":true,"extra":"ignored"}"#;
        assert!(LockRecord::decode(raw).is_some());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(LockRecord::decode(b"not json").is_none());
    }

    #[test]
    fn encode_never_emits_unknown_fields() {
        let record = LockRecord::new_exclusive(1, "s");
        let value: serde_json::Value = serde_json::from_slice(&record.encode()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("secret"));
        assert!(obj.contains_key("exclusive"));
    }
}
