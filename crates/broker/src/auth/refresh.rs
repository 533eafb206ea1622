// Reactive token refresh.
//
// Refresh runs only when a credential is read and found expired; there is
// no background sweep. On success the stored record is rewritten under
// the same key with the new token material; on failure the stale record
// is left untouched until its own TTL evicts it.

use chrono::Utc;

use crate::{
    auth::credentials::{CredentialRecord, CredentialStore},
    error::{BrokerError, ErrorCode},
    providers::{client::ProviderClient, ProviderDescriptor},
};

/// Return `record` as-is while it is still valid, otherwise run the
/// provider's refresh grant and persist the replacement.
pub async fn ensure_fresh(
    credentials: &CredentialStore,
    client: &dyn ProviderClient,
    provider: &ProviderDescriptor,
    session_id: &str,
    record: CredentialRecord,
) -> Result<CredentialRecord, BrokerError> {
    if record.expires_at > Utc::now() {
        return Ok(record);
    }

    tracing::info!(
        provider = provider.name,
        user_id = record.user_id,
        expired_at = %record.expires_at,
        "token expired, refreshing"
    );

    let grant = client.refresh_token(provider, &record.refresh_token).await?;

    let refreshed = CredentialRecord {
        access_token: grant.access_token,
        // Providers may omit the refresh token from a refresh grant; the
        // previous one stays valid in that case.
        refresh_token: grant.refresh_token.unwrap_or(record.refresh_token),
        expires_at: grant.expires_at,
        user_id: record.user_id,
        display_name: record.display_name,
        email: record.email,
    };

    credentials.put(session_id, &provider.name, &refreshed).await.map_err(|error| {
        BrokerError::new(
            ErrorCode::StorageFailure,
            format!("Failed to store refreshed token: {error}"),
        )
    })?;

    Ok(refreshed)
}
