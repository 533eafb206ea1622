use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Stable error codes for the auth broker.
///
/// Every failure the broker surfaces maps to one of these codes; the
/// human-readable message carries a stable fragment that client
/// integrations pattern-match on, so default messages must not be
/// reworded casually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnsupportedProvider,
    InvalidRedirectUri,
    MalformedState,
    InvalidOrExpiredState,
    MissingAuthorizationCode,
    ExchangeFailed,
    UserInfoFetchFailed,
    StorageFailure,
    RefreshFailed,
    NotFound,
    MissingSession,
    MissingRequiredParameter,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedProvider => "UNSUPPORTED_PROVIDER",
            Self::InvalidRedirectUri => "INVALID_REDIRECT_URI",
            Self::MalformedState => "MALFORMED_STATE",
            Self::InvalidOrExpiredState => "INVALID_OR_EXPIRED_STATE",
            Self::MissingAuthorizationCode => "MISSING_AUTHORIZATION_CODE",
            Self::ExchangeFailed => "EXCHANGE_FAILED",
            Self::UserInfoFetchFailed => "USER_INFO_FETCH_FAILED",
            Self::StorageFailure => "STORAGE_FAILURE",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::MissingSession => "MISSING_SESSION",
            Self::MissingRequiredParameter => "MISSING_REQUIRED_PARAMETER",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::UnsupportedProvider => StatusCode::BAD_REQUEST,
            Self::InvalidRedirectUri => StatusCode::BAD_REQUEST,
            Self::MalformedState => StatusCode::BAD_REQUEST,
            Self::InvalidOrExpiredState => StatusCode::BAD_REQUEST,
            Self::MissingAuthorizationCode => StatusCode::BAD_REQUEST,
            Self::ExchangeFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UserInfoFetchFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RefreshFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MissingSession => StatusCode::BAD_REQUEST,
            Self::MissingRequiredParameter => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::StorageFailure | Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::UnsupportedProvider => "Unsupported provider",
            Self::InvalidRedirectUri => "Invalid redirect URI",
            Self::MalformedState => "Invalid state parameter",
            Self::InvalidOrExpiredState => "Invalid or expired state",
            Self::MissingAuthorizationCode => "Authorization code not provided",
            Self::ExchangeFailed => "Failed to exchange token",
            Self::UserInfoFetchFailed => "Failed to fetch user information",
            Self::StorageFailure => "Storage operation failed",
            Self::RefreshFailed => "Failed to refresh token",
            Self::NotFound => "Token not found",
            Self::MissingSession => "Session ID is required",
            Self::MissingRequiredParameter => "Missing required parameter",
            Self::InternalError => "internal server error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerError {
    code: ErrorCode,
    message: String,
    status_override: Option<StatusCode>,
    request_id: Option<String>,
}

impl BrokerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), status_override: None, request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Override the HTTP status while keeping the code and message.
    ///
    /// Needed where one condition maps to different statuses per endpoint
    /// (unknown provider is 404 at login but 400 elsewhere; a missing
    /// session is 400 on token/logout but 401 on status).
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);
        let status = self.status_override.unwrap_or_else(|| self.code.status());

        let mut response = (
            status,
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
