// The authorization flow itself: login, callback, token retrieval,
// logout, and status aggregation.
//
// Ordering invariants in the callback are deliberate:
// - the PKCE verifier is consumed (atomically) before the authorization
//   code is even looked at, so CSRF protection cannot be bypassed by
//   omitting the code;
// - the verifier consume happens-before the code exchange, which needs it
//   as a parameter;
// - residual state-token cleanup is fire-and-forget and never fails the
//   request.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{
    auth::{
        credentials::{CredentialRecord, CredentialStore},
        pkce::{generate_pkce_pair, PkceStore},
        redirect::validate_redirect_uri,
        refresh::ensure_fresh,
        state::{bind_state, issue_state_token, split_state, StateTokenStore},
    },
    error::{BrokerError, ErrorCode},
    providers::{client::ProviderClient, ProviderDescriptor, ProviderRegistry},
    store::KeyValueStore,
};

const SESSION_COOKIE: &str = "session_id";

/// Shared state for the auth routes. Everything inside is read-only after
/// construction or safe for concurrent use.
#[derive(Clone)]
pub struct BrokerState {
    registry: Arc<ProviderRegistry>,
    client: Arc<dyn ProviderClient>,
    pkce: PkceStore,
    state_tokens: StateTokenStore,
    credentials: CredentialStore,
    allowed_redirect_domains: Arc<Vec<String>>,
}

impl BrokerState {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn ProviderClient>,
        allowed_redirect_domains: Vec<String>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            client,
            pkce: PkceStore::new(Arc::clone(&store)),
            state_tokens: StateTokenStore::new(Arc::clone(&store)),
            credentials: CredentialStore::new(store),
            allowed_redirect_domains: Arc::new(allowed_redirect_domains),
        }
    }

    fn descriptor(&self, provider: &str) -> Result<Arc<ProviderDescriptor>, BrokerError> {
        self.registry
            .get(provider)
            .ok_or_else(|| BrokerError::from_code(ErrorCode::UnsupportedProvider))
    }
}

pub fn router(state: BrokerState) -> Router {
    Router::new()
        .route("/auth/status", get(status))
        .route("/auth/{provider}/login", get(login))
        .route("/auth/{provider}/callback", get(callback))
        .route("/auth/{provider}/token", get(get_token))
        .route("/auth/{provider}/logout", post(logout))
        .with_state(state)
}

// ─── Login ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginParams {
    redirect_uri: Option<String>,
}

async fn login(
    State(state): State<BrokerState>,
    Path(provider): Path<String>,
    Query(params): Query<LoginParams>,
) -> Result<Response, BrokerError> {
    tracing::info!(provider, redirect_uri = ?params.redirect_uri, "starting provider login");

    let descriptor = state
        .descriptor(&provider)
        .map_err(|error| error.with_status(StatusCode::NOT_FOUND))?;

    let redirect_uri = params
        .redirect_uri
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            BrokerError::new(ErrorCode::MissingRequiredParameter, "redirect_uri is required")
        })?;
    if !validate_redirect_uri(&redirect_uri, &state.allowed_redirect_domains) {
        return Err(BrokerError::from_code(ErrorCode::InvalidRedirectUri));
    }

    let state_token = issue_state_token();
    let pkce = generate_pkce_pair();

    state.state_tokens.put(&state_token).await.map_err(|error| {
        tracing::error!(%error, "failed to store state token");
        BrokerError::new(ErrorCode::StorageFailure, "Server error while storing PKCE data")
    })?;
    state.pkce.store(&state_token, &pkce.verifier).await.map_err(|error| {
        tracing::error!(%error, "failed to store PKCE data");
        BrokerError::new(ErrorCode::StorageFailure, "Server error while storing PKCE data")
    })?;

    let public_state = bind_state(&state_token, &redirect_uri);
    let auth_url = build_authorization_url(&descriptor, &public_state, &pkce.challenge)?;

    tracing::info!(provider, auth_url, "redirecting to auth provider");
    Ok(Redirect::temporary(&auth_url).into_response())
}

fn build_authorization_url(
    descriptor: &ProviderDescriptor,
    public_state: &str,
    code_challenge: &str,
) -> Result<String, BrokerError> {
    let mut url = Url::parse(&descriptor.auth_url).map_err(|error| {
        tracing::error!(?error, provider = descriptor.name, "invalid authorize URL configuration");
        BrokerError::from_code(ErrorCode::InternalError)
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("client_id", &descriptor.client_id);
        pairs.append_pair("response_type", "code");
        pairs.append_pair("redirect_uri", &descriptor.redirect_url);
        pairs.append_pair("scope", &descriptor.scopes.join(" "));
        pairs.append_pair("state", public_state);
        pairs.append_pair("code_challenge", code_challenge);
        pairs.append_pair("code_challenge_method", "S256");
        pairs.append_pair("access_type", "offline");
    }

    Ok(url.to_string())
}

// ─── Callback ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

async fn callback(
    State(state): State<BrokerState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, BrokerError> {
    tracing::info!(provider, "received auth provider callback");

    let descriptor = state.descriptor(&provider)?;

    let raw_state = params
        .state
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BrokerError::from_code(ErrorCode::MalformedState))?;
    let (state_token, redirect_uri) = split_state(&raw_state)
        .ok_or_else(|| BrokerError::from_code(ErrorCode::MalformedState))?;

    if !validate_redirect_uri(redirect_uri, &state.allowed_redirect_domains) {
        return Err(BrokerError::from_code(ErrorCode::InvalidRedirectUri));
    }

    // One-time consumption of the PKCE verifier. This is the single-use
    // gate for the whole state token: a second callback with the same
    // state observes absence here, whatever else it carries.
    let code_verifier = state
        .pkce
        .consume(state_token)
        .await
        .map_err(|error| {
            tracing::error!(%error, "failed to retrieve code verifier");
            BrokerError::new(ErrorCode::StorageFailure, "Failed to retrieve code verifier")
        })?
        .ok_or_else(|| BrokerError::from_code(ErrorCode::InvalidOrExpiredState))?;

    state.state_tokens.cleanup_async(state_token);

    // Checked after state/PKCE validation on purpose: omitting the code
    // must not bypass CSRF protection.
    let code = params
        .code
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BrokerError::from_code(ErrorCode::MissingAuthorizationCode))?;

    let grant = state.client.exchange_code(&descriptor, &code, &code_verifier).await?;
    let user = state.client.fetch_user_info(&descriptor, &grant.access_token).await?;

    let session_id = Uuid::new_v4().to_string();
    let record = CredentialRecord {
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.unwrap_or_default(),
        expires_at: grant.expires_at,
        user_id: user.id,
        display_name: user.display_name,
        email: user.email,
    };
    state.credentials.put(&session_id, &provider, &record).await.map_err(|error| {
        tracing::error!(%error, session_id, provider, "failed to store credential");
        BrokerError::new(ErrorCode::StorageFailure, "Failed to store token")
    })?;

    tracing::info!(session_id, provider, user_id = record.user_id, "successfully authenticated user");

    let mut response = Redirect::temporary(redirect_uri).into_response();
    response.headers_mut().append(SET_COOKIE, session_cookie_header(&session_id)?);
    Ok(response)
}

fn session_cookie_header(session_id: &str) -> Result<HeaderValue, BrokerError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; Secure; SameSite=Lax"
    ))
    .map_err(|_| BrokerError::from_code(ErrorCode::InternalError))
}

/// Pull the session id out of the request's `Cookie` headers.
fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

// ─── Token retrieval ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenParams {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Absolute expiry as a unix timestamp. The field name is historical;
    /// existing clients depend on it.
    expires_in: i64,
}

async fn get_token(
    State(state): State<BrokerState>,
    Path(provider): Path<String>,
    Query(params): Query<TokenParams>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, BrokerError> {
    let descriptor = state.descriptor(&provider)?;

    let session_id = session_from_headers(&headers)
        .ok_or_else(|| BrokerError::from_code(ErrorCode::MissingSession))?;
    let user_id = params
        .user_id
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            BrokerError::new(ErrorCode::MissingRequiredParameter, "User ID is required")
        })?;

    let record = state
        .credentials
        .get(&session_id, &provider, &user_id)
        .await
        .map_err(|error| {
            tracing::error!(%error, "failed to retrieve credential");
            BrokerError::new(ErrorCode::StorageFailure, "Failed to retrieve token")
        })?
        .ok_or_else(|| BrokerError::from_code(ErrorCode::NotFound))?;

    let record =
        ensure_fresh(&state.credentials, state.client.as_ref(), &descriptor, &session_id, record)
            .await?;

    tracing::info!(provider, user_id, expires_at = %record.expires_at, "retrieved token");

    Ok(Json(TokenResponse {
        access_token: record.access_token,
        refresh_token: record.refresh_token,
        expires_in: record.expires_at.timestamp(),
    }))
}

// ─── Logout ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LogoutParams {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    message: String,
}

async fn logout(
    State(state): State<BrokerState>,
    Path(provider): Path<String>,
    Query(params): Query<LogoutParams>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, BrokerError> {
    state.descriptor(&provider)?;

    let session_id = session_from_headers(&headers)
        .ok_or_else(|| BrokerError::from_code(ErrorCode::MissingSession))?;

    // Deleting a record that does not exist is not an error; logout is
    // idempotent.
    let message = match params.user_id.filter(|value| !value.is_empty()) {
        Some(user_id) => {
            state.credentials.delete(&session_id, &provider, &user_id).await.map_err(
                |error| {
                    tracing::error!(%error, session_id, provider, user_id, "failed to log out user");
                    BrokerError::new(ErrorCode::StorageFailure, "Failed to log out user")
                },
            )?;
            tracing::info!(session_id, provider, user_id, "logged out user");
            format!("Successfully logged out user {user_id} from provider {provider}")
        }
        None => {
            state.credentials.delete_all(&session_id, &provider).await.map_err(|error| {
                tracing::error!(%error, session_id, provider, "failed to log out all users");
                BrokerError::new(ErrorCode::StorageFailure, "Failed to log out all users")
            })?;
            tracing::info!(session_id, provider, "logged out all users");
            format!("Successfully logged out all users from provider {provider}")
        }
    };

    Ok(Json(LogoutResponse { message }))
}

// ─── Status ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ProviderLink {
    provider: String,
    user_id: String,
    display_name: String,
    email: String,
    logged_in: bool,
}

async fn status(
    State(state): State<BrokerState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProviderLink>>, BrokerError> {
    let session_id = session_from_headers(&headers).ok_or_else(|| {
        BrokerError::from_code(ErrorCode::MissingSession).with_status(StatusCode::UNAUTHORIZED)
    })?;

    let credentials = state.credentials.list_by_session(&session_id).await.map_err(|error| {
        tracing::error!(%error, session_id, "failed to list session credentials");
        BrokerError::new(ErrorCode::StorageFailure, "Failed to retrieve status")
    })?;

    let links = credentials
        .into_iter()
        .map(|credential| ProviderLink {
            provider: credential.provider,
            user_id: credential.record.user_id,
            display_name: credential.record.display_name,
            email: credential.record.email,
            logged_in: true,
        })
        .collect();

    Ok(Json(links))
}
