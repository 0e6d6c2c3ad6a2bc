//! Provisioner creates platform accounts on behalf of administrators.

#![forbid(unsafe_code)]
pub mod caller;
pub mod config;
pub mod crypto;
mod database;
pub mod document;
pub mod error;
pub mod identity;
pub mod profile;
pub mod provision;
mod router;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::crypto::PasswordManager;
use crate::document::{DocumentStore, MemoryDocumentStore, PostgresDocumentStore};
use crate::identity::{IdentityStore, MemoryIdentityStore, PostgresIdentityStore};
use crate::provision::Provisioner;

const CONFIG_PATH_VAR: &str = "CONFIG_PATH";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub token: token::TokenManager,
    pub provisioner: Provisioner,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::metrics))
        // `POST /createUser` goes to `create`.
        .route("/createUser", post(router::create::handler))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let pwd = PasswordManager::new(config.argon2.clone())?;

    let (identity, documents) =
        match config.postgres {
            Some(ref config) => {
                let pool = database::connect(
                    &config.address,
                    config
                        .username
                        .as_deref()
                        .unwrap_or(database::DEFAULT_CREDENTIALS),
                    config
                        .password
                        .as_deref()
                        .unwrap_or(database::DEFAULT_CREDENTIALS),
                    config
                        .database
                        .as_deref()
                        .unwrap_or(database::DEFAULT_DATABASE_NAME),
                    config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
                )
                .await?;

                let identity: Arc<dyn IdentityStore> =
                    Arc::new(PostgresIdentityStore::new(pool.clone(), pwd));
                let documents: Arc<dyn DocumentStore> =
                    Arc::new(PostgresDocumentStore::new(pool));
                (identity, documents)
            },
            None => {
                tracing::warn!(
                    "missing `postgres` entry on configuration, accounts are kept in memory"
                );
                let identity: Arc<dyn IdentityStore> =
                    Arc::new(MemoryIdentityStore::new(pwd));
                let documents: Arc<dyn DocumentStore> =
                    Arc::new(MemoryDocumentStore::new());
                (identity, documents)
            },
        };

    let provisioner = Provisioner::new(identity, documents);
    if let Some(uid) = &config.bootstrap_admin {
        provisioner.ensure_admin(uid).await?;
    }

    // handle jwt.
    let Some(token_config) = &config.token else {
        return Err("missing `token` entry on configuration".into());
    };
    let mut token = token::TokenManager::new(
        &config.url,
        &token_config.public_key_pem,
        token_config.private_key_pem.as_deref(),
    )?;
    if let Some(audience) = &token_config.audience {
        token.audience(audience);
    }

    Ok(AppState {
        config,
        token,
        provisioner,
        metrics: None,
    })
}
