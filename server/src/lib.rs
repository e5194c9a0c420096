pub mod config;
pub mod error;
pub mod metrics;
pub mod stream;
pub mod validation;

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use speech_core::{segment, Chunk, VoiceCatalog, VoiceInfo};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, DetailedMetricsResponse};
use crate::stream::ChannelSink;
use crate::validation::{validate_stream_request, validate_text};

#[derive(Clone)]
pub struct AppState {
    pub voices: Arc<dyn VoiceCatalog>,
    pub metrics: AppMetrics,
    pub config: ServerConfig,
    pub started: Instant,
}

impl AppState {
    pub fn new(voices: Arc<dyn VoiceCatalog>, config: ServerConfig) -> Self {
        Self {
            voices,
            metrics: AppMetrics::new(),
            config,
            started: Instant::now(),
        }
    }
}

#[derive(Deserialize)]
pub struct StreamRequest {
    #[serde(alias = "text")]
    message: String,
    language: Option<String>,
    voice: Option<String>,
}

#[derive(Deserialize)]
pub struct ChunkQuery {
    text: String,
}

/// Routes, served both at the root and under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/voices", get(list_voices))
        .route("/voices/detail", get(list_voices_detail))
        .route("/chunk", get(chunk_text))
        .route("/tts/stream", post(tts_stream))
        .route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(v) = value.clone() {
        request.headers_mut().insert("x-request-id", v);
    }
    let mut response = next.run(request).await;
    if let Some(v) = value {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.voices.languages())
}

pub async fn list_voices_detail(State(state): State<AppState>) -> Json<Vec<VoiceInfo>> {
    Json(state.voices.voices())
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    Json(state.metrics.snapshot(state.started.elapsed().as_secs()))
}

/// Show how a text would be split for synthesis.
pub async fn chunk_text(
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
) -> Result<Json<Vec<Chunk>>, ApiError> {
    let started = Instant::now();
    if let Err(e) = validate_text(&query.text) {
        state.metrics.chunk.record_error();
        return Err(e);
    }
    let chunks = segment(&query.text);
    state
        .metrics
        .chunk
        .record_request(started.elapsed().as_millis() as u64);
    Ok(Json(chunks))
}

/// Synthesize `message` chunk by chunk and stream the audio back in order.
///
/// Errors found before the first byte (validation, unknown language, backend
/// that cannot be loaded) get a JSON error response. Once streaming has
/// begun the status is already sent; a failure then truncates the body.
pub async fn tts_stream(
    State(state): State<AppState>,
    Json(req): Json<StreamRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = start_stream(&state, req, started).await;
    if result.is_err() {
        state.metrics.stream.record_error();
    }
    result
}

async fn start_stream(state: &AppState, req: StreamRequest, started: Instant) -> Result<Response, ApiError> {
    validate_stream_request(&req.message, req.language.as_deref(), req.voice.as_deref())?;

    if let Some(lang) = req.language.as_deref() {
        if !state.voices.languages().iter().any(|l| l == lang) {
            return Err(ApiError::NotFound(format!(
                "Unknown language key: {lang}. Use /voices to list."
            )));
        }
    }

    // Resolving may load a model from disk; keep it off the async workers.
    let voices = state.voices.clone();
    let (language, voice) = (req.language.clone(), req.voice.clone());
    let backend = tokio::task::spawn_blocking(move || {
        voices.resolve(language.as_deref(), voice.as_deref())
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Voice loading task failed: {e}")))??;
    let content_type = backend.content_type();

    let chunks = segment(&req.message);
    let chunk_count = chunks.len();
    info!(
        chunks = chunk_count,
        text_len = req.message.len(),
        language = ?req.language,
        "Streaming synthesis"
    );

    let (mut sink, body) = ChannelSink::channel(state.config.stream_buffer_chunks);
    if let Some(preamble) = backend.stream_header() {
        sink.preamble(&preamble);
    }
    let pipeline = state.config.pipeline();
    let metrics = state.metrics.clone();

    tokio::spawn(async move {
        let outcome = speech_core::run(chunks, backend, &mut sink, &pipeline).await;
        metrics.pipeline.record_emitted(&sink.sent());
        match outcome {
            Ok(_) => {
                metrics.pipeline.record_completed();
                metrics
                    .stream
                    .record_request(started.elapsed().as_millis() as u64);
            }
            Err(e) => {
                warn!("Synthesis stream aborted: {e}");
                metrics.pipeline.record_aborted();
                metrics.stream.record_error();
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-chunk-count", chunk_count)
        .body(body)
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {e}")))
}
