//! HTTP gateway server built on axum.

use crate::config::ServerConfig;
use crate::error::HandlerError;
use crate::handler::ChatCompletionHandler;
use axum::{
    Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Content type of a successful chat response.
pub const PLAIN_TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// Shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayServer>;

/// The HTTP gateway: listener settings, the handler and request counters.
pub struct GatewayServer {
    config: ServerConfig,
    handler: ChatCompletionHandler,
    started_at: Instant,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("requests", &self.requests_served())
            .field("failures", &self.failures())
            .finish()
    }
}

impl GatewayServer {
    pub fn new(config: ServerConfig, handler: ChatCompletionHandler) -> Self {
        Self {
            config,
            handler,
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &ChatCompletionHandler {
        &self.handler
    }

    /// Uptime in seconds since the server was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Chat requests received so far.
    pub fn requests_served(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Chat requests that ended in an error payload.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Build an axum Router with the chat route and `/health`.
pub fn router(shared: SharedGateway) -> Router {
    let route = normalize_route(&shared.config().route);
    Router::new()
        .route(
            &route,
            post(chat_handler).layer(DefaultBodyLimit::max(shared.config().max_body_bytes)),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

fn normalize_route(route: &str) -> String {
    if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{}", route)
    }
}

/// Chat endpoint. Takes the raw body so that unparseable or oversized input
/// gets the same error payload as every other setup failure.
async fn chat_handler(
    State(gw): State<SharedGateway>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    gw.requests.fetch_add(1, Ordering::Relaxed);
    let result = match body {
        Ok(body) => gw.handler.handle_body(&body).await,
        Err(rejection) => {
            warn!(
                status = %rejection.status(),
                error = %rejection.body_text(),
                "Request body rejected"
            );
            Err(HandlerError::malformed(rejection.body_text()))
        }
    };
    match result {
        Ok(tokens) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PLAIN_TEXT_UTF8)],
            Body::from_stream(tokens),
        )
            .into_response(),
        Err(err) => {
            gw.failures.fetch_add(1, Ordering::Relaxed);
            err.into_response()
        }
    }
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "requests": gw.requests_served(),
        "failures": gw.failures(),
        "uptime_secs": gw.uptime_secs(),
    });
    axum::Json(body)
}

/// Start the gateway server on the configured address.
///
/// This is an async function that runs until cancelled.
pub async fn run(gw: SharedGateway) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", gw.config().host, gw.config().port);
    let route = gw.config().route.clone();
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, route = %route, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
