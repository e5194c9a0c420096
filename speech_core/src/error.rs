use std::time::Duration;

use thiserror::Error;

/// Failure to produce audio for a single chunk.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend returned no audio")]
    EmptyPayload,

    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("synthesis cancelled")]
    Cancelled,

    #[error("synthesis task failed: {0}")]
    TaskFailed(String),
}

impl From<anyhow::Error> for SynthesisError {
    fn from(e: anyhow::Error) -> Self {
        SynthesisError::Backend(format!("{e:#}"))
    }
}

/// Outcome of a stream that did not complete.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("synthesis failed for chunk {index}: {source}")]
    SynthesisFailed {
        index: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("stream writer failed: {0}")]
    SinkFailed(#[source] std::io::Error),

    #[error("synthesis backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl PipelineError {
    /// Index of the chunk that caused the abort, if a chunk did.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            PipelineError::SynthesisFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}
