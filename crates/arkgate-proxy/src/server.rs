//! Axum HTTP server for the gateway.
//!
//! This module provides the router and the `serve()` function that runs it on
//! a pre-bound `TcpListener` until the cancellation token fires.

use std::sync::Arc;
use std::time::Instant;

use arkgate_core::{BackendPayload, Credential, GatewayConfig, ParsedRequest};
use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, field, info, info_span};
use uuid::Uuid;

use crate::backend::{BackendClient, BackendOutcome, BackendStream};
use crate::error::GatewayError;
use crate::relay::{ChannelSink, log_relay_result, relay_lines};

/// Shared application state. Read-only after construction.
#[derive(Clone)]
pub struct AppState {
    config: Arc<GatewayConfig>,
    backend: BackendClient,
}

impl AppState {
    /// Build state from a validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let backend = BackendClient::new(&config.backend)?;
        Ok(Self {
            config: Arc::new(config),
            backend,
        })
    }
}

/// Build the gateway router.
///
/// Routes:
/// - `GET /health`: liveness probe
/// - `GET /v1/models`: caller-facing model names in OpenAI list format
/// - `POST /v1/chat/completions`: translate, forward, and relay
///
/// Every 5xx response is logged with its latency.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(middleware::from_fn(log_server_errors))
        .with_state(state)
}

/// Start the gateway with a pre-bound listener.
///
/// This function validates the configuration, then runs the Axum server until
/// the cancellation token is triggered.
///
/// # Arguments
///
/// * `listener` - Pre-bound TCP listener
/// * `config` - Merged gateway configuration
/// * `cancel` - Cancellation token for graceful shutdown
///
/// # Returns
///
/// Returns `Ok(())` on clean shutdown, or an error if the configuration is
/// invalid, the backend client cannot be built, or the server fails.
pub async fn serve(
    listener: TcpListener,
    config: GatewayConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    config.validate()?;

    let addr = listener.local_addr()?;
    let state = AppState::new(config)?;

    info!(
        upstream = %state.backend.endpoint(),
        models = state.config.models.names().count(),
        strict_models = state.config.strict_models,
        "Gateway listening on {addr}"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Gateway shut down");
    Ok(())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

#[derive(Debug, Serialize)]
struct ModelList<'a> {
    object: &'static str,
    data: Vec<ModelEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ModelEntry<'a> {
    id: &'a str,
    object: &'static str,
    owned_by: &'static str,
}

/// List caller-facing model names in OpenAI format.
async fn list_models(State(state): State<AppState>) -> Response {
    let data = state
        .config
        .models
        .names()
        .map(|id| ModelEntry {
            id,
            object: "model",
            owned_by: "arkgate",
        })
        .collect();

    Json(ModelList {
        object: "list",
        data,
    })
    .into_response()
}

/// Log every 5xx response with its latency.
async fn log_server_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    if response.status().is_server_error() {
        error!(
            %method,
            %path,
            status = response.status().as_u16(),
            latency = ?start.elapsed(),
            "Request failed"
        );
    }

    response
}

/// Chat completions: authenticate, parse, resolve, translate, call, relay.
async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let span = info_span!(
        "chat_completion",
        request_id = %Uuid::new_v4(),
        model = field::Empty,
        stream = field::Empty,
    );
    handle_chat(state, headers, body).instrument(span).await
}

async fn handle_chat(
    state: AppState,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    debug!(bytes = body.len(), "POST /v1/chat/completions");

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let credential =
        Credential::from_authorization(authorization).ok_or(GatewayError::Unauthorized)?;

    let ParsedRequest {
        request,
        extensions,
    } = ParsedRequest::parse(&body)?;

    let span = Span::current();
    span.record("model", request.model.as_str());
    span.record("stream", request.stream);

    let deployment = resolve_deployment(&state.config, &request.model)?;

    info!(
        deployment,
        messages = request.messages.len(),
        extensions = extensions.len(),
        "Processing chat completion request"
    );

    let stream = request.stream;
    let payload = BackendPayload::translate(deployment, request.messages, stream, extensions);

    match (stream, state.backend.send(&credential, &payload).await) {
        (_, BackendOutcome::Failed(e)) => Err(e.into()),
        (true, BackendOutcome::Streaming(source)) => Ok(streaming_response(source)),
        (false, BackendOutcome::Buffered(doc)) => Ok(Json(doc).into_response()),
        (true, BackendOutcome::Buffered(_)) => Err(GatewayError::Internal(
            "backend returned a buffered response for a streaming request".into(),
        )),
        (false, BackendOutcome::Streaming(_)) => Err(GatewayError::Internal(
            "backend returned a stream for a non-streaming request".into(),
        )),
    }
}

/// Map a model name to its deployment, honouring strict mode.
fn resolve_deployment<'a>(config: &'a GatewayConfig, model: &str) -> Result<&'a str, GatewayError> {
    if config.strict_models {
        return config
            .models
            .lookup(model)
            .ok_or_else(|| GatewayError::UnknownModel(model.to_string()));
    }
    if config.models.lookup(model).is_none() {
        debug!(
            requested = model,
            fallback = config.models.default_model(),
            "Unknown model, using default"
        );
    }
    Ok(config.models.resolve(model))
}

/// Start relaying `source` on its own task and return the response that
/// carries its output.
fn streaming_response(source: BackendStream) -> Response {
    let (mut sink, frames) = ChannelSink::new();

    tokio::spawn(
        async move {
            let result = relay_lines(source, &mut sink).await;
            log_relay_result(&result);
        }
        .instrument(Span::current()),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no") // Disable nginx buffering
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
