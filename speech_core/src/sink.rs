//! The transport-side end of a stream.

use async_trait::async_trait;

use crate::error::PipelineError;

/// Ordered byte sink for one stream.
///
/// The pipeline drives a writer from a single task, so implementations never
/// see concurrent calls. Bytes must reach the peer in `write` order.
#[async_trait]
pub trait StreamWriter: Send {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    async fn flush(&mut self) -> std::io::Result<()>;

    /// End of stream after a clean completion.
    async fn close(&mut self) -> std::io::Result<()>;

    /// Called once when the stream is aborted. Writers that can signal
    /// truncation to the peer should do it here.
    async fn abort(&mut self, _reason: &PipelineError) {}
}
