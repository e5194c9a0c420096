//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::Request,
    Router,
};
use bytes::Bytes;
use server::config::ServerConfig;
use server::AppState;
use speech_core::{
    AudioFormat, PipelineError, SynthesisBackend, SynthesisError, VoiceCatalog, VoiceInfo,
};

pub const WAV_SAMPLE_RATE: u32 = 16_000;

fn latency_for(text: &str) -> Duration {
    Duration::from_millis(40u64.saturating_sub(text.len() as u64 * 2))
}

/// Returns `<text>` for each chunk. Shorter chunks take longer, so
/// completion order differs from chunk order. Chunks containing "fail"
/// are rejected.
pub struct FakeBackend;

#[async_trait]
impl SynthesisBackend for FakeBackend {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        tokio::time::sleep(latency_for(text)).await;
        if text.contains("fail") {
            return Err(SynthesisError::Backend(format!("refused: {text}")));
        }
        Ok(Bytes::from(format!("<{text}>")))
    }

    fn content_type(&self) -> String {
        "audio/test".to_string()
    }
}

/// Samples for one chunk: `len` copies of a level derived from the text.
pub fn wav_samples_for(text: &str) -> Vec<f32> {
    vec![text.len() as f32 / 100.0; text.len()]
}

/// Serves the WAV stream format the way a real voice does.
pub struct FakeWavBackend;

#[async_trait]
impl SynthesisBackend for FakeWavBackend {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        tokio::time::sleep(latency_for(text)).await;
        Ok(AudioFormat::Wav.encode(&wav_samples_for(text)))
    }

    fn content_type(&self) -> String {
        AudioFormat::Wav.content_type(WAV_SAMPLE_RATE)
    }

    fn stream_header(&self) -> Option<Bytes> {
        AudioFormat::Wav.stream_header(WAV_SAMPLE_RATE).ok().flatten()
    }
}

/// Voice "broken" cannot be loaded, voice "wav" streams WAV audio.
#[derive(Default)]
pub struct FakeCatalog {
    pub resolve_threads: Mutex<Vec<ThreadId>>,
}

impl VoiceCatalog for FakeCatalog {
    fn languages(&self) -> Vec<String> {
        vec!["de_DE".to_string(), "en_US".to_string()]
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.languages()
            .into_iter()
            .map(|language| VoiceInfo {
                config: format!("models/{language}/voice.onnx.json"),
                language,
                voice: Some("default".to_string()),
            })
            .collect()
    }

    fn resolve(
        &self,
        _language: Option<&str>,
        voice: Option<&str>,
    ) -> Result<Arc<dyn SynthesisBackend>, PipelineError> {
        self.resolve_threads
            .lock()
            .unwrap()
            .push(std::thread::current().id());
        match voice {
            Some("broken") => Err(PipelineError::BackendUnavailable(
                "model file missing".to_string(),
            )),
            Some("wav") => Ok(Arc::new(FakeWavBackend)),
            _ => Ok(Arc::new(FakeBackend)),
        }
    }
}

/// Create a test app instance
pub fn create_test_app() -> Router {
    create_test_app_with(Arc::new(FakeCatalog::default()))
}

pub fn create_test_app_with(catalog: Arc<FakeCatalog>) -> Router {
    let config = ServerConfig {
        max_concurrent_synthesis: 3,
        chunk_timeout_secs: 5,
        ..ServerConfig::default()
    };
    server::router(AppState::new(catalog, config))
}

pub fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
