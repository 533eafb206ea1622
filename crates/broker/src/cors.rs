// CORS middleware configuration for the broker server.
//
// Reads allowed origins from the `ATTACHE_BROKER_CORS_ORIGINS` environment
// variable (comma-separated). Falls back to permissive localhost defaults
// in development.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Default origins allowed when `ATTACHE_BROKER_CORS_ORIGINS` is unset.
const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5173",
];

/// Build a [`CorsLayer`] from the configured origin list.
///
/// - If the value is `"*"`, allows any origin (and drops credentials,
///   which the Fetch spec forbids alongside a wildcard).
/// - If it is a comma-separated list, allows exactly those origins.
/// - If unset, allows the default development origins.
///
/// All configurations allow credentials (the session cookie), the common
/// methods the broker serves, and expose `X-Request-Id` to the browser.
pub fn cors_layer(configured_origins: Option<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match configured_origins.as_deref() {
        Some("*") => base.allow_origin(AllowOrigin::any()).allow_credentials(false),
        Some(origins) => base.allow_origin(parse_origins(origins)),
        None => base.allow_origin(parse_origins(&DEFAULT_DEV_ORIGINS.join(","))),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}
