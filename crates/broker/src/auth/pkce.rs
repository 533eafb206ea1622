// PKCE verifier/challenge lifecycle.
//
// A verifier is generated at login, stored under the state token with a
// short TTL, and consumed exactly once at callback. Consumption is an
// atomic get-and-delete; a failed exchange afterwards does not resurrect
// the verifier, the client must restart the login flow.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::{KeyValueStore, StoreError};

const VERIFIER_BYTES: usize = 32;
const PKCE_TTL_MINUTES: i64 = 5;

/// A freshly generated verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a high-entropy code verifier and derive its challenge.
pub fn generate_pkce_pair() -> PkcePair {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = challenge_for(&verifier);
    PkcePair { verifier, challenge }
}

/// `base64url(SHA-256(verifier))` — the S256 code challenge.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
struct PkceEntry {
    code_verifier: String,
}

fn pkce_key(state_token: &str) -> String {
    format!("pkce:{state_token}")
}

/// TTL-bounded verifier storage keyed by state token.
#[derive(Clone)]
pub struct PkceStore {
    store: Arc<dyn KeyValueStore>,
}

impl PkceStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist `verifier` under `state_token` for five minutes. Overwrites
    /// on collision; state tokens are high-entropy so collisions only occur
    /// when a caller reuses a token deliberately.
    pub async fn store(&self, state_token: &str, verifier: &str) -> Result<(), StoreError> {
        let entry = serde_json::to_string(&PkceEntry { code_verifier: verifier.to_string() })?;
        self.store
            .put(&pkce_key(state_token), entry, Duration::minutes(PKCE_TTL_MINUTES))
            .await
    }

    /// Atomically read and delete the verifier for `state_token`.
    ///
    /// Returns `None` when the entry was never stored, already consumed,
    /// or expired — callers cannot distinguish these, by design.
    pub async fn consume(&self, state_token: &str) -> Result<Option<String>, StoreError> {
        let Some(raw) = self.store.take(&pkce_key(state_token)).await? else {
            return Ok(None);
        };
        let entry: PkceEntry = serde_json::from_str(&raw)?;
        Ok(Some(entry.code_verifier))
    }
}
