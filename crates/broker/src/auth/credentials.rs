// Per-(session, provider, account) credential persistence.
//
// Keys follow `session:{session_id}_{provider}_{account_id}` so that one
// browser session can hold several accounts per provider and accounts
// across providers side by side. Storage TTL tracks token expiry exactly:
// a record self-evicts the moment its access token would be stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, StoreError};

/// A stored provider credential plus the identity it belongs to.
///
/// Re-login with the same `(session, provider, user_id)` triple overwrites
/// the record; there is no pending or partially-written state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub display_name: String,
    pub email: String,
}

/// A credential together with the provider it was parsed out of the key.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub provider: String,
    pub record: CredentialRecord,
}

fn credential_key(session_id: &str, provider: &str, user_id: &str) -> String {
    format!("session:{session_id}_{provider}_{user_id}")
}

fn session_prefix(session_id: &str) -> String {
    format!("session:{session_id}_")
}

fn provider_prefix(session_id: &str, provider: &str) -> String {
    format!("session:{session_id}_{provider}_")
}

#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write `record`, keyed by the triple, with storage TTL equal to the
    /// remaining token lifetime. An already-expired record evicts almost
    /// immediately, which is intentional.
    pub async fn put(
        &self,
        session_id: &str,
        provider: &str,
        record: &CredentialRecord,
    ) -> Result<(), StoreError> {
        let key = credential_key(session_id, provider, &record.user_id);
        let value = serde_json::to_string(record)?;
        let ttl = record.expires_at - Utc::now();
        self.store.put(&key, value, ttl).await
    }

    /// Fetch one credential. A record that fails to deserialize is treated
    /// as absent rather than as an error.
    pub async fn get(
        &self,
        session_id: &str,
        provider: &str,
        user_id: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let Some(raw) = self.store.get(&credential_key(session_id, provider, user_id)).await?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(error) => {
                tracing::warn!(%error, session_id, provider, user_id, "skipping malformed credential record");
                Ok(None)
            }
        }
    }

    pub async fn delete(
        &self,
        session_id: &str,
        provider: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.store.delete(&credential_key(session_id, provider, user_id)).await
    }

    /// Delete every account credential for `provider` under the session.
    /// Matching nothing is a no-op, not an error.
    pub async fn delete_all(&self, session_id: &str, provider: &str) -> Result<u64, StoreError> {
        self.store.delete_by_prefix(&provider_prefix(session_id, provider)).await
    }

    /// List every credential attached to the session.
    ///
    /// Malformed entries are skipped so one corrupt record cannot take the
    /// whole status view down.
    pub async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<SessionCredential>, StoreError> {
        let prefix = session_prefix(session_id);
        let entries = self.store.list_by_prefix(&prefix).await?;

        let mut credentials = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let Some(provider) = provider_from_key(&key, &prefix) else {
                continue;
            };
            match serde_json::from_str::<CredentialRecord>(&raw) {
                Ok(record) => credentials.push(SessionCredential { provider, record }),
                Err(error) => {
                    tracing::warn!(%error, key, "skipping malformed credential record");
                }
            }
        }
        Ok(credentials)
    }
}

/// Extract the provider segment from `session:{sid}_{provider}_{user_id}`.
///
/// The account id may itself contain underscores; provider names do not,
/// so only the first separator after the session prefix counts.
fn provider_from_key(key: &str, session_prefix: &str) -> Option<String> {
    let rest = key.strip_prefix(session_prefix)?;
    let (provider, user_id) = rest.split_once('_')?;
    if provider.is_empty() || user_id.is_empty() {
        return None;
    }
    Some(provider.to_string())
}
