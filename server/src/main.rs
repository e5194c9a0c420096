use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use server::config::ServerConfig;
use server::AppState;
use speech_core::{PiperVoices, VoiceCatalog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting speech streaming server...");

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, max_concurrent_synthesis={}, chunk_timeout={}s, format={:?}",
        config.port,
        config.rate_limit_per_minute,
        config.max_concurrent_synthesis,
        config.chunk_timeout_secs,
        config.audio_format
    );

    info!("Loading voice map from {}...", config.voice_map_path);
    let voices = PiperVoices::from_mapfile(&config.voice_map_path, &config.default_language, config.audio_format)
        .unwrap_or_else(|e| {
            warn!("Could not load {}: {e:#}, using empty voice map.", config.voice_map_path);
            PiperVoices::new(HashMap::new(), &config.default_language, config.audio_format)
        })
        .with_max_cached_models(config.max_cached_models);
    info!("Loaded {} languages", voices.languages().len());

    let state = AppState::new(Arc::new(voices), config.clone());

    // CORS configuration - environment-aware
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let origins: Vec<axum::http::HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        CorsLayer::new().allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::list(origins))
    };
    let cors = cors
        .allow_methods(methods)
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    // Global limit: all clients share the same bucket
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(u64::from(config.rate_limit_per_minute / 60).max(1))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("invalid rate limit configuration")?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    // The timeout bounds the time to response headers; streamed bodies are
    // bounded per chunk by CHUNK_TIMEOUT_SECS instead.
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    let app = server::router(state).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
