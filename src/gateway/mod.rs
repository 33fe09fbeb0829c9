//! The Drive Gateway: share-token endpoints and Drive relays.
//!
//! Every request is independent; the only state shared between handlers is
//! the read-only token secret, the service credential cache and the
//! outbound connection pool.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use crate::auth::AccessTokenProvider;
use crate::client::{http_client, DriveClient};
use crate::error::Result;
use crate::token::TokenService;

mod config;
mod error;
mod relay;
mod share;
mod tokens;

pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use tokens::{IssueRequest, IssueResponse, ValidateRequest, ValidateResponse};

pub const RELAY_PATH: &str = "/drive-proxy";
pub const ISSUE_TOKEN_PATH: &str = "/share-tokens";
pub const VALIDATE_TOKEN_PATH: &str = "/share-tokens/validate";
pub const SHARE_FILE_PATH: &str = "/share/file";
pub const SHARE_FOLDER_PATH: &str = "/share/folder";
pub const SHARE_FOLDER_FILE_PATH: &str = "/share/folder/file";
pub const HEALTH_PATH: &str = "/_status/healthz";

/// Shared, read-only state of the Gateway.
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<Inner>,
}

struct Inner {
    config: GatewayConfig,
    tokens: TokenService,
    service_auth: Arc<dyn AccessTokenProvider>,
    drive: DriveClient,
    http: Client,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        tokens: TokenService,
        service_auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let http = http_client(config.upstream_timeout)?;
        let drive = DriveClient::with_base(service_auth.clone(), http.clone(), &config.drive_api_base);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                service_auth,
                drive,
                http,
            }),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    pub(crate) fn drive(&self) -> &DriveClient {
        &self.inner.drive
    }

    pub(crate) fn http(&self) -> &Client {
        &self.inner.http
    }

    /// Make sure a service credential is available before touching Drive.
    pub(crate) async fn acquire_service_credential(&self) -> std::result::Result<(), GatewayError> {
        self.inner
            .service_auth
            .access_token()
            .await
            .map(|_| ())
            .map_err(GatewayError::ServiceCredential)
    }
}

/// Build the Gateway router.
pub fn router(state: GatewayState) -> Router {
    let log_level = state.config().log_level;
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    let cors = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any)
        .allow_credentials(false);

    Router::new()
        .route(RELAY_PATH, post(relay::handler).options(preflight))
        .route(ISSUE_TOKEN_PATH, post(tokens::issue).options(preflight))
        .route(VALIDATE_TOKEN_PATH, post(tokens::validate).options(preflight))
        .route(SHARE_FILE_PATH, get(share::file).options(preflight))
        .route(SHARE_FOLDER_PATH, get(share::folder).options(preflight))
        .route(SHARE_FOLDER_FILE_PATH, get(share::folder_file).options(preflight))
        .route(HEALTH_PATH, get(healthz))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .layer(trace_layer)
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

// CORS preflights answered by the CORS layer come back as an empty 200.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status().is_success() {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler(headers: HeaderMap) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok());

    match accept {
        Some(accept_str) if accept_str.contains("application/json") => {
            let err_msg = serde_json::json!({"error": "not found"});
            (StatusCode::NOT_FOUND, Json(err_msg)).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            [(CONTENT_TYPE, "text/plain")],
            "not found",
        )
            .into_response(),
    }
}

/// Serve the Gateway until `shutdown_rx` fires.
pub async fn run(
    state: GatewayState,
    mut shutdown_rx: watch::Receiver<()>,
) -> std::result::Result<(), GatewayServerError> {
    let listen_addr = state.config().listen_addr;
    let app = router(state);

    tracing::info!(addr = ?listen_addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
