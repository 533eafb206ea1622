// Outbound calls to identity providers: authorization-code exchange,
// user-info fetch, and the refresh-token grant.
//
// The trait uses boxed futures for object safety so tests can inject a
// mock; the real implementation drives `reqwest` against the descriptor's
// endpoints.

use std::{future::Future, pin::Pin, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{
    error::{BrokerError, ErrorCode},
    providers::{response::UserInfo, ProviderDescriptor},
};

/// Boxed future alias for object safety / dynamic dispatch in tests.
pub type ClientFuture<T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send>>;

/// Token material returned by a provider's token endpoint.
///
/// `refresh_token` is `None` when the provider omits it from a refresh
/// grant; callers carry the previous refresh token forward in that case.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Provider-facing API calls made during login, callback, and refresh.
pub trait ProviderClient: Send + Sync {
    fn exchange_code(
        &self,
        provider: &ProviderDescriptor,
        code: &str,
        code_verifier: &str,
    ) -> ClientFuture<TokenGrant>;

    fn fetch_user_info(
        &self,
        provider: &ProviderDescriptor,
        access_token: &str,
    ) -> ClientFuture<UserInfo>;

    fn refresh_token(
        &self,
        provider: &ProviderDescriptor,
        refresh_token: &str,
    ) -> ClientFuture<TokenGrant>;
}

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;
const HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Wire shape of an OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenEndpointResponse {
    fn into_grant(self) -> TokenGrant {
        let ttl = self.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS);
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(ttl),
        }
    }
}

/// [`ProviderClient`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new() -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()
            .map_err(|error| {
                BrokerError::new(ErrorCode::InternalError, format!("http client init: {error}"))
            })?;
        Ok(Self { http })
    }
}

impl ProviderClient for HttpProviderClient {
    fn exchange_code(
        &self,
        provider: &ProviderDescriptor,
        code: &str,
        code_verifier: &str,
    ) -> ClientFuture<TokenGrant> {
        let http = self.http.clone();
        let token_url = provider.token_url.clone();
        let form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), provider.redirect_url.clone()),
            ("code_verifier".to_string(), code_verifier.to_string()),
            ("client_id".to_string(), provider.client_id.clone()),
            ("client_secret".to_string(), provider.client_secret.clone()),
        ];
        Box::pin(async move {
            token_grant_request(&http, &token_url, &form, ErrorCode::ExchangeFailed).await
        })
    }

    fn fetch_user_info(
        &self,
        provider: &ProviderDescriptor,
        access_token: &str,
    ) -> ClientFuture<UserInfo> {
        let http = self.http.clone();
        let user_info_url = provider.user_info_url.clone();
        let kind = provider.kind;
        let access_token = access_token.to_string();
        Box::pin(async move {
            let fetch_error = |detail: String| {
                BrokerError::new(
                    ErrorCode::UserInfoFetchFailed,
                    format!("Failed to fetch user information: {detail}"),
                )
            };

            let response = http
                .get(&user_info_url)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|error| fetch_error(error.to_string()))?;

            let status = response.status();
            let body =
                response.bytes().await.map_err(|error| fetch_error(error.to_string()))?;
            if !status.is_success() {
                return Err(fetch_error(format!(
                    "provider returned {status}: {}",
                    String::from_utf8_lossy(&body)
                )));
            }

            kind.decode_user_info(&body).map_err(|error| fetch_error(error.to_string()))
        })
    }

    fn refresh_token(
        &self,
        provider: &ProviderDescriptor,
        refresh_token: &str,
    ) -> ClientFuture<TokenGrant> {
        let http = self.http.clone();
        let token_url = provider.token_url.clone();
        let form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), provider.client_id.clone()),
            ("client_secret".to_string(), provider.client_secret.clone()),
        ];
        Box::pin(async move {
            token_grant_request(&http, &token_url, &form, ErrorCode::RefreshFailed).await
        })
    }
}

async fn token_grant_request(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(String, String)],
    code: ErrorCode,
) -> Result<TokenGrant, BrokerError> {
    let grant_error =
        |detail: String| BrokerError::new(code, format!("{}: {detail}", code.default_message()));

    let response = http
        .post(token_url)
        .form(form)
        .send()
        .await
        .map_err(|error| grant_error(error.to_string()))?;

    let status = response.status();
    let body = response.bytes().await.map_err(|error| grant_error(error.to_string()))?;
    if !status.is_success() {
        return Err(grant_error(format!(
            "provider returned {status}: {}",
            String::from_utf8_lossy(&body)
        )));
    }

    let parsed: TokenEndpointResponse =
        serde_json::from_slice(&body).map_err(|error| grant_error(error.to_string()))?;
    Ok(parsed.into_grant())
}
