// Configuration for the server and the streaming pipeline

use std::{str::FromStr, time::Duration};

use speech_core::{AudioFormat, PipelineConfig};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub voice_map_path: String,
    pub default_language: String,
    pub max_cached_models: usize,
    pub max_concurrent_synthesis: usize,
    pub chunk_timeout_secs: u64,
    /// Synthesized chunks buffered between the pipeline and the HTTP body.
    pub stream_buffer_chunks: usize,
    pub audio_format: AudioFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            voice_map_path: "models/map.json".to_string(),
            default_language: "en_US".to_string(),
            max_cached_models: 8,
            max_concurrent_synthesis: 4,
            chunk_timeout_secs: 30,
            stream_buffer_chunks: 8,
            audio_format: AudioFormat::Wav,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {key}: {v:?}");
            default
        }),
        Err(_) => default,
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins,
            voice_map_path: env_or("VOICE_MAP_PATH", defaults.voice_map_path),
            default_language: env_or("DEFAULT_LANGUAGE", defaults.default_language),
            max_cached_models: env_or("MAX_CACHED_MODELS", defaults.max_cached_models),
            max_concurrent_synthesis: env_or("MAX_CONCURRENT_SYNTHESIS", defaults.max_concurrent_synthesis).max(1),
            chunk_timeout_secs: env_or("CHUNK_TIMEOUT_SECS", defaults.chunk_timeout_secs),
            stream_buffer_chunks: env_or("STREAM_BUFFER_CHUNKS", defaults.stream_buffer_chunks).max(1),
            audio_format: env_or("AUDIO_FORMAT", defaults.audio_format),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            max_concurrency: self.max_concurrent_synthesis,
            chunk_timeout: self.chunk_timeout(),
        }
    }
}
