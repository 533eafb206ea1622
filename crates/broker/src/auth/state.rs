// Anti-forgery state tokens.
//
// The public `state` parameter sent to the provider is the token and the
// caller's redirect URI joined with `|`; the redirect URI rides through
// the provider round-trip opaquely instead of being stored server-side.
// The token half is bound 1:1 to a PKCE entry, whose atomic consumption
// is the real single-use gate. The presence marker written here is only
// residual bookkeeping, cleaned up best-effort after validation.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::store::{KeyValueStore, StoreError};

const STATE_TTL_MINUTES: i64 = 5;

/// Issue a random, unguessable state token.
pub fn issue_state_token() -> String {
    Uuid::new_v4().to_string()
}

/// Build the public `state` parameter: `token|redirect_uri`.
pub fn bind_state(token: &str, redirect_uri: &str) -> String {
    format!("{token}|{redirect_uri}")
}

/// Split a callback `state` parameter on the first `|`.
///
/// Returns `None` for a state with no separator. The redirect URI may
/// itself contain `|`, which is why only the first separator counts.
pub fn split_state(state: &str) -> Option<(&str, &str)> {
    state.split_once('|')
}

fn state_key(token: &str) -> String {
    format!("state:{token}")
}

/// Presence markers for issued state tokens.
#[derive(Clone)]
pub struct StateTokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl StateTokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record that `token` was issued; expires alongside the PKCE entry.
    pub async fn put(&self, token: &str) -> Result<(), StoreError> {
        self.store
            .put(&state_key(token), "1".to_string(), Duration::minutes(STATE_TTL_MINUTES))
            .await
    }

    /// Whether `token` is currently live (issued, unconsumed, unexpired).
    pub async fn is_live(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&state_key(token)).await?.is_some())
    }

    /// Best-effort asynchronous deletion of the residual marker.
    ///
    /// Runs detached from the request; a deletion failure is logged and
    /// never surfaced, since the PKCE consumption that precedes it has
    /// already made the token unusable.
    pub fn cleanup_async(&self, token: &str) {
        let store = Arc::clone(&self.store);
        let key = state_key(token);
        tokio::spawn(async move {
            if let Err(error) = store.delete(&key).await {
                tracing::warn!(%error, key, "failed to delete residual state token");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{bind_state, issue_state_token, split_state, StateTokenStore};
    use crate::store::MemoryStore;

    #[test]
    fn issued_tokens_are_unique() {
        assert_ne!(issue_state_token(), issue_state_token());
    }

    #[test]
    fn bind_and_split_round_trip() {
        let state = bind_state("tok-1", "http://app.example.com/cb");
        assert_eq!(split_state(&state), Some(("tok-1", "http://app.example.com/cb")));
    }

    #[test]
    fn split_uses_first_separator_only() {
        assert_eq!(
            split_state("tok|http://app/cb?x=a|b"),
            Some(("tok", "http://app/cb?x=a|b"))
        );
    }

    #[test]
    fn split_rejects_state_without_separator() {
        assert_eq!(split_state("just-a-token"), None);
    }

    #[tokio::test]
    async fn marker_presence_tracks_put() {
        let tokens = StateTokenStore::new(Arc::new(MemoryStore::new()));
        assert!(!tokens.is_live("tok-1").await.unwrap());
        tokens.put("tok-1").await.unwrap();
        assert!(tokens.is_live("tok-1").await.unwrap());
    }
}
