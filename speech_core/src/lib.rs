//! Speech synthesis streamed chunk by chunk.
//!
//! An utterance is [segmented](segment::segment) at punctuation, every chunk
//! is synthesized concurrently, and the [pipeline](pipeline::run) writes the
//! audio to a [`StreamWriter`] in the original chunk order, stopping at the
//! first failure.

pub mod audio;
pub mod backend;
pub mod error;
pub mod piper;
pub mod pipeline;
pub mod segment;
pub mod sink;

pub use audio::AudioFormat;
pub use backend::{SynthesisBackend, VoiceCatalog, VoiceInfo};
pub use error::{PipelineError, SynthesisError};
pub use piper::{PiperBackend, PiperVoices};
pub use pipeline::{
    run, synthesize_stream, PipelineConfig, PipelineState, StreamReport, StreamSession,
    SynthesisResult,
};
pub use segment::{segment, Chunk};
pub use sink::StreamWriter;
