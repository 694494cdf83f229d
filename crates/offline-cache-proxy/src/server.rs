//! HTTP server hosting the offline cache worker
//!
//! Provides /health, the /sw/* lifecycle triggers, and a fallback that
//! offers every other request to the worker as a fetch event.

use crate::types::{ErrorResponse, HealthResponse, LifecycleResponse, MessageResponse};
use asset_cache_store::StoredResponse;
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use offline_reconciler::{
    ControlMessage, Dispatched, FetchMode, FetchOutcome, FetchRequest, LifecycleEvent,
    ReconcilerError, ResourceFetcher, ResponseSource, Worker,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use url::Url;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared state for the HTTP server
pub struct ServerState {
    pub worker: Worker,
    /// Used for requests the worker passes through
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(worker: Worker, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            worker,
            fetcher,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sw/install", post(install))
        .route("/sw/activate", post(activate))
        .route("/sw/message", post(message))
        .fallback(proxy_request)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until ctrl-c
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Response {
    let storage = state.worker.storage();
    let names = match storage.names().await {
        Ok(names) => names,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut caches = BTreeMap::new();
    for name in names {
        match storage.open(&name).await {
            Ok(cache) => {
                caches.insert(name, cache.stats().await);
            }
            Err(e) => warn!(cache = %name, error = %e, "Failed to open cache for stats"),
        }
    }

    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        worker: state.worker.state().await,
        controls_clients: state.worker.controls_clients(),
        manifest_entries: state.worker.config().manifest.len(),
        caches,
    })
    .into_response()
}

async fn install(State(state): State<SharedState>) -> Response {
    lifecycle(&state, LifecycleEvent::Install).await
}

async fn activate(State(state): State<SharedState>) -> Response {
    lifecycle(&state, LifecycleEvent::Activate).await
}

async fn lifecycle(state: &ServerState, event: LifecycleEvent) -> Response {
    debug!(event = ?event, "Dispatching lifecycle event");
    match state.worker.dispatch(event).await {
        Ok(Dispatched::State(state)) => Json(LifecycleResponse { state }).into_response(),
        Ok(Dispatched::Fetch(_)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "unexpected fetch outcome".to_string(),
        ),
        Err(e) => reconciler_error_response(e),
    }
}

/// Accept a control message. The body is the bare message name.
async fn message(State(state): State<SharedState>, body: String) -> Response {
    let name = body.trim().trim_matches('"');
    let Some(message) = ControlMessage::parse(name) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown message: {}", name),
        );
    };

    match state
        .worker
        .dispatch(LifecycleEvent::Message(message))
        .await
    {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                accepted: message.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(e) => reconciler_error_response(e),
    }
}

/// Offer a request to the worker, or forward it to the origin
async fn proxy_request(State(state): State<SharedState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{} is not supported", method),
        );
    }

    let Some(url) = origin_url(&state.worker.config().origin, &uri) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("{} does not resolve on the origin", uri),
        );
    };

    let request = FetchRequest::new(method.as_str(), url.clone());
    match state.worker.dispatch(LifecycleEvent::Fetch(request)).await {
        Ok(Dispatched::Fetch(FetchOutcome::Respond { response, source })) => {
            stored_response(response, Some(cache_header(source)))
        }
        Ok(_) => match state.fetcher.fetch(&url, FetchMode::Default).await {
            Ok(response) => stored_response(response, None),
            Err(e) => {
                warn!(url = %url, error = %e, "Passthrough fetch failed");
                error_response(StatusCode::BAD_GATEWAY, e.to_string())
            }
        },
        Err(e) => {
            warn!(url = %url, error = %e, "Worker fetch failed");
            reconciler_error_response(e)
        }
    }
}

/// Place the request path and query on the configured origin.
///
/// The path is never resolved as a reference, so `//host/x` stays a path.
fn origin_url(origin: &Url, uri: &Uri) -> Option<Url> {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    (url.origin() == origin.origin()).then_some(url)
}

fn cache_header(source: ResponseSource) -> HeaderValue {
    match source {
        ResponseSource::Cache => HeaderValue::from_static("HIT"),
        ResponseSource::Network => HeaderValue::from_static("MISS"),
        ResponseSource::CacheFallback => HeaderValue::from_static("STALE"),
    }
}

fn stored_response(response: StoredResponse, cache: Option<HeaderValue>) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut res = (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response();
    if let Some(value) = cache {
        res.headers_mut().insert(X_CACHE, value);
    }
    res
}

fn reconciler_error_response(err: ReconcilerError) -> Response {
    let status = match &err {
        ReconcilerError::InvalidState { .. } => StatusCode::CONFLICT,
        ReconcilerError::Http(_)
        | ReconcilerError::Network(_)
        | ReconcilerError::BadStatus { .. }
        | ReconcilerError::IncompleteFill { .. } => StatusCode::BAD_GATEWAY,
        ReconcilerError::Store(_)
        | ReconcilerError::Manifest(_)
        | ReconcilerError::InvalidUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
