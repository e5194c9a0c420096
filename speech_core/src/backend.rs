//! Collaborator seams used by the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PipelineError, SynthesisError};

/// Converts one chunk of text into an audio payload.
///
/// Implementations are called concurrently from several tasks with
/// independent inputs and must not rely on call order.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError>;

    /// MIME type of the bytes returned by [`synthesize`](Self::synthesize).
    fn content_type(&self) -> String {
        "application/octet-stream".to_string()
    }

    /// Container header sent once ahead of the first chunk, for formats that
    /// need one.
    fn stream_header(&self) -> Option<Bytes> {
        None
    }
}

/// Voice listing entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VoiceInfo {
    pub language: String,
    pub voice: Option<String>,
    pub config: String,
}

/// Resolves a language (and optional voice) to a ready backend.
///
/// Resolution happens once per request, before any chunk is dispatched, so a
/// missing model or unreadable config surfaces as
/// [`PipelineError::BackendUnavailable`] instead of a mid-stream failure.
pub trait VoiceCatalog: Send + Sync {
    fn languages(&self) -> Vec<String>;

    fn voices(&self) -> Vec<VoiceInfo>;

    fn resolve(
        &self,
        language: Option<&str>,
        voice: Option<&str>,
    ) -> Result<Arc<dyn SynthesisBackend>, PipelineError>;
}
