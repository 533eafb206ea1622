// Key-value storage boundary for auth state.
//
// Everything the broker persists (PKCE verifiers, state-token markers,
// credential records) goes through `KeyValueStore`. The trait mirrors the
// operations of a Redis-style durable store: get, set-with-TTL, atomic
// get-and-delete, delete, and prefix scans. The shipped backend is an
// in-memory map with expiry pruning; a durable backend can be swapped in
// behind the same trait.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// Boxed future alias for object safety / dynamic dispatch.
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),
    #[error("stored value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage operations required by the auth flow.
///
/// One-time tokens rely on `take` being atomic with respect to concurrent
/// consumers: of two racing callers, at most one may observe the value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreFuture<Option<String>>;

    /// Write `value` under `key`, expiring after `ttl`. Overwrites any
    /// existing entry. A non-positive TTL means the entry is already
    /// expired and will never be readable.
    fn put(&self, key: &str, value: String, ttl: Duration) -> StoreFuture<()>;

    /// Atomically read and delete. Returns `None` when the key is absent
    /// or expired.
    fn take(&self, key: &str) -> StoreFuture<Option<String>>;

    fn delete(&self, key: &str) -> StoreFuture<()>;

    /// Delete every live key starting with `prefix`. Returns the number of
    /// entries removed; matching nothing is not an error.
    fn delete_by_prefix(&self, prefix: &str) -> StoreFuture<u64>;

    /// List `(key, value)` pairs for every live key starting with `prefix`.
    fn list_by_prefix(&self, prefix: &str) -> StoreFuture<Vec<(String, String)>>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory [`KeyValueStore`] backend.
///
/// Entries carry an absolute expiry and are pruned whenever the map is
/// locked for writing, so an expired entry is indistinguishable from a
/// deleted one.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn prune_expired(entries: &mut HashMap<String, StoredEntry>) {
    let now = Utc::now();
    entries.retain(|_, entry| entry.expires_at > now);
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreFuture<Option<String>> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move {
            let mut guard = entries.write().await;
            prune_expired(&mut guard);
            Ok(guard.get(&key).map(|entry| entry.value.clone()))
        })
    }

    fn put(&self, key: &str, value: String, ttl: Duration) -> StoreFuture<()> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move {
            let mut guard = entries.write().await;
            prune_expired(&mut guard);
            guard.insert(key, StoredEntry { value, expires_at: Utc::now() + ttl });
            Ok(())
        })
    }

    fn take(&self, key: &str) -> StoreFuture<Option<String>> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move {
            let mut guard = entries.write().await;
            prune_expired(&mut guard);
            Ok(guard.remove(&key).map(|entry| entry.value))
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<()> {
        let entries = Arc::clone(&self.entries);
        let key = key.to_owned();
        Box::pin(async move {
            entries.write().await.remove(&key);
            Ok(())
        })
    }

    fn delete_by_prefix(&self, prefix: &str) -> StoreFuture<u64> {
        let entries = Arc::clone(&self.entries);
        let prefix = prefix.to_owned();
        Box::pin(async move {
            let mut guard = entries.write().await;
            prune_expired(&mut guard);
            let before = guard.len();
            guard.retain(|key, _| !key.starts_with(&prefix));
            Ok((before - guard.len()) as u64)
        })
    }

    fn list_by_prefix(&self, prefix: &str) -> StoreFuture<Vec<(String, String)>> {
        let entries = Arc::clone(&self.entries);
        let prefix = prefix.to_owned();
        Box::pin(async move {
            let mut guard = entries.write().await;
            prune_expired(&mut guard);
            let mut matches: Vec<(String, String)> = guard
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect();
            matches.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(matches)
        })
    }
}
