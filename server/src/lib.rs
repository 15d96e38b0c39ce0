pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, warn};

use llm_core::{sentences::sentences, ChatMessage, LlmClient};
use tts_core::SpeechClient;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{EndpointMetricsResponse, MetricsResponse, RelayMetrics, SystemMetrics};

/// Canned filler line the text endpoint presents as already spoken.
pub const FILLER_LINE: &str = "Sure, let me check that for you.";

/// Developer turn for the text endpoint's continuation request.
pub const STREAM_INSTRUCTIONS: &str = "Please generate a full response to the \
    user request. The response should be a direct continuation of the short \
    response, as it will be transcribed to a speech.";

#[derive(Clone)]
pub struct AppState {
    pub llm: LlmClient,
    pub tts: SpeechClient,
    pub metrics: Arc<RelayMetrics>,
    pub config: ServerConfig,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Build the router with the full middleware stack.
pub fn app(state: AppState) -> Router {
    let _ = START_TIME.get_or_init(Instant::now);
    let config = &state.config;

    // CORS configuration - environment-aware
    let cors = if let Some(ref allowed_origins) = config.cors_allowed_origins {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin: &String| origin.parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
                .allow_headers(tower_http::cors::Any)
        } else {
            CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::list(origins))
                .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
                .allow_headers(tower_http::cors::Any)
        }
    } else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    // Global rate limit shared by all callers; avoids per-IP extraction
    // behind proxies.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(((config.rate_limit_per_minute / 60).max(1)) as u64)
            .burst_size(config.rate_limit_per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .unwrap(),
    );

    // TimeoutLayer bounds the handler future only; streaming bodies are
    // not subject to it.
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream_text))
        .route("/stream_audio", get(stream_audio))
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}

/// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    request.headers_mut().insert(
        "x-request-id",
        axum::http::HeaderValue::from_str(&request_id).unwrap(),
    );
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-request-id",
        axum::http::HeaderValue::from_str(&request_id).unwrap(),
    );
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct StreamQuery {
    question: String,
}

/// Streams the generated response as newline-delimited sentences.
///
/// The question is forwarded as-is; the upstream model's own validation
/// error, if any, propagates.
pub async fn stream_text(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    state.metrics.text.record_request();

    let turn = vec![
        ChatMessage::user(query.question),
        ChatMessage::assistant(FILLER_LINE),
        ChatMessage::developer(STREAM_INSTRUCTIONS),
    ];

    // The upstream request is opened here so pre-stream failures map to
    // an error status instead of an empty 200.
    let tokens = state.llm.stream_chat(turn).await.map_err(|e| {
        state.metrics.text.record_error();
        ApiError::Llm(e)
    })?;

    let metrics = state.metrics.clone();
    let lines = sentences(tokens).map(move |item| {
        item.inspect_err(|e| {
            metrics.text.record_error();
            error!("text stream ended abnormally: {e:#}");
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Streams the generated audio as an MP3 response.
///
/// Quick clip first, full clip immediately after, no separator. A
/// failure once audio has been sent has no HTTP status to carry it and
/// terminates the stream.
pub async fn stream_audio(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    state.metrics.audio.record_request();

    let audio =
        pipeline::two_phase_audio(state.llm.clone(), state.tts.clone(), query.question)
            .await
            .map_err(|e| {
                state.metrics.audio.record_error();
                e
            })?;

    let metrics = state.metrics.clone();
    let body = audio.map(move |item| {
        item.inspect_err(|e| {
            metrics.audio.record_error();
            error!("audio stream ended abnormally: {e:#}");
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from_stream(body),
    )
        .into_response())
}

/// Serve the landing page, read from disk on every request.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let content = tokio::fs::read_to_string(&state.config.index_path)
        .await
        .map_err(|e| ApiError::NotFound(format!("landing page unavailable: {e}")))?;
    Ok(Html(content))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.metrics.total_requests(),
            uptime_seconds: uptime,
        },
        endpoints: EndpointMetricsResponse {
            stream: state.metrics.text.snapshot(),
            stream_audio: state.metrics.audio.snapshot(),
        },
    })
}
