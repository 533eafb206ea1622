mod auth;
mod config;
mod cors;
mod error;
mod providers;
mod store;

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    auth::BrokerState,
    config::BrokerConfig,
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    },
    providers::{client::HttpProviderClient, ProviderRegistry},
    store::MemoryStore,
};

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BrokerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    let client = HttpProviderClient::new()
        .map_err(|e| anyhow::anyhow!("failed to build provider http client: {}", e.message()))?;

    let state = BrokerState::new(
        ProviderRegistry::from_env(),
        Arc::new(MemoryStore::new()),
        Arc::new(client),
        config.allowed_redirect_domains.clone(),
    );
    let app = build_router(state, config.cors_origins.clone());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind broker listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting auth broker");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("broker server exited unexpectedly")
}

fn build_router(state: BrokerState, cors_origins: Option<String>) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(auth::router(state))
            .layer(cors::cors_layer(cors_origins)),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response =
        with_request_id_scope(request_id.clone(), async move { next.run(request).await }).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::{apply_middleware, build_router};
    use crate::{
        auth::BrokerState,
        providers::{client::HttpProviderClient, ProviderRegistry},
        store::MemoryStore,
    };

    fn test_router() -> Router {
        let client =
            Arc::new(HttpProviderClient::new().expect("test http client should build"));
        let state = BrokerState::new(
            ProviderRegistry::default(),
            Arc::new(MemoryStore::new()),
            client,
            vec!["localhost".to_string()],
        );
        build_router(state, None)
    }

    #[tokio::test]
    async fn health_check_has_request_id_header() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn incoming_request_id_is_echoed_back() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-abc-123")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-abc-123");
    }

    #[tokio::test]
    async fn panic_handler_returns_internal_server_error() {
        async fn panic_route() -> &'static str {
            panic!("test panic");
        }

        let app = apply_middleware(Router::new().route("/panic", get(panic_route)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/panic")
                    .body(Body::empty())
                    .expect("panic request should build"),
            )
            .await
            .expect("panic request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/auth/nope")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
