//! Ordered concurrent chunk synthesis.
//!
//! Chunks are synthesized on the tokio runtime through a window of
//! [`PipelineConfig::max_concurrency`] indices starting at the emit cursor:
//! chunk `i` is launched only once `i < cursor + max_concurrency`. Results
//! come back in completion order; a single emitter holds them in a
//! [`StreamSession`] and writes them to the sink strictly by index. Calls in
//! flight plus results held never exceed the window.
//!
//! The first failure aborts the stream: nothing is written after it, in-flight
//! tasks are cancelled and whatever they still return is dropped.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SynthesisBackend;
use crate::error::{PipelineError, SynthesisError};
use crate::segment::{segment, Chunk};
use crate::sink::StreamWriter;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on synthesis calls in flight for one stream.
    pub max_concurrency: usize,
    /// Deadline for a single chunk; expiry counts as a synthesis failure.
    pub chunk_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            chunk_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Aborted,
    Completed,
}

/// Audio (or the failure) for one chunk, tagged with the chunk's index.
#[derive(Debug)]
pub struct SynthesisResult {
    pub index: usize,
    pub outcome: Result<Bytes, SynthesisError>,
}

/// Summary of a completed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub chunks: usize,
    pub bytes: u64,
}

/// Emitter-side state for one stream.
///
/// Owned by the emitter alone; synthesis tasks never touch it.
#[derive(Debug)]
pub struct StreamSession {
    total: usize,
    next_index: usize,
    pending: BTreeMap<usize, Bytes>,
    state: PipelineState,
}

impl StreamSession {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            next_index: 0,
            pending: BTreeMap::new(),
            state: PipelineState::Running,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Lowest index not yet emitted.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Number of results waiting for their turn.
    pub fn held(&self) -> usize {
        self.pending.len()
    }

    /// Every chunk has been handed out for emission.
    pub fn is_drained(&self) -> bool {
        self.next_index >= self.total
    }

    /// Hold a successful result until the cursor reaches it.
    ///
    /// Returns `false` when the result is discarded: the stream is no longer
    /// running, the index is out of range, or it was already seen.
    pub fn admit(&mut self, index: usize, payload: Bytes) -> bool {
        if self.state != PipelineState::Running
            || index < self.next_index
            || index >= self.total
            || self.pending.contains_key(&index)
        {
            return false;
        }
        self.pending.insert(index, payload);
        true
    }

    /// Take the result at the cursor, if it has arrived, and advance.
    pub fn pop_ready(&mut self) -> Option<(usize, Bytes)> {
        if self.state != PipelineState::Running {
            return None;
        }
        let payload = self.pending.remove(&self.next_index)?;
        let index = self.next_index;
        self.next_index += 1;
        Some((index, payload))
    }

    pub fn abort(&mut self) {
        if self.state == PipelineState::Running {
            self.state = PipelineState::Aborted;
            self.pending.clear();
        }
    }

    pub fn complete(&mut self) {
        if self.state == PipelineState::Running && self.is_drained() {
            self.state = PipelineState::Completed;
        }
    }
}

/// Segment `utterance` and stream its audio to `sink`.
pub async fn synthesize_stream<W>(
    utterance: &str,
    backend: Arc<dyn SynthesisBackend>,
    sink: &mut W,
    config: &PipelineConfig,
) -> Result<StreamReport, PipelineError>
where
    W: StreamWriter + ?Sized,
{
    let chunks = segment(utterance);
    if chunks.is_empty() {
        info!("Utterance produced no chunks, closing stream");
    }
    run(chunks, backend, sink, config).await
}

/// Synthesize `chunks` concurrently and write them to `sink` in index order.
pub async fn run<W>(
    chunks: Vec<Chunk>,
    backend: Arc<dyn SynthesisBackend>,
    sink: &mut W,
    config: &PipelineConfig,
) -> Result<StreamReport, PipelineError>
where
    W: StreamWriter + ?Sized,
{
    let started = Instant::now();
    let mut session = StreamSession::new(chunks.len());
    let mut report = StreamReport::default();
    let cancel = CancellationToken::new();
    let mut tasks: JoinSet<SynthesisResult> = JoinSet::new();
    let mut queue = chunks.into_iter().peekable();
    let window = config.max_concurrency.max(1);

    let dispatch = |tasks: &mut JoinSet<SynthesisResult>, chunk: Chunk| {
        tasks.spawn(synthesize_chunk(
            backend.clone(),
            chunk,
            config.chunk_timeout,
            cancel.clone(),
        ));
    };

    while let Some(chunk) = queue.next_if(|c| c.index < window) {
        dispatch(&mut tasks, chunk);
    }

    let outcome: Result<(), PipelineError> = async {
        while !session.is_drained() {
            let SynthesisResult { index, outcome } = match tasks.join_next().await {
                Some(Ok(result)) => result,
                Some(Err(e)) => SynthesisResult {
                    index: session.next_index(),
                    outcome: Err(SynthesisError::TaskFailed(e.to_string())),
                },
                None => SynthesisResult {
                    index: session.next_index(),
                    outcome: Err(SynthesisError::TaskFailed("no task left for chunk".into())),
                },
            };

            let payload = outcome.map_err(|source| PipelineError::SynthesisFailed { index, source })?;

            if !session.admit(index, payload) {
                warn!(index, "Discarding unexpected synthesis result");
                continue;
            }
            if index != session.next_index() {
                debug!(index, cursor = session.next_index(), "Holding out-of-order chunk");
            }

            while let Some((index, payload)) = session.pop_ready() {
                sink.write(&payload).await.map_err(PipelineError::SinkFailed)?;
                sink.flush().await.map_err(PipelineError::SinkFailed)?;
                report.chunks += 1;
                report.bytes += payload.len() as u64;
                debug!(index, bytes = payload.len(), "Sent chunk");
            }

            // Slide the window up to the new cursor.
            let limit = session.next_index() + window;
            while let Some(chunk) = queue.next_if(|c| c.index < limit) {
                dispatch(&mut tasks, chunk);
            }
        }
        sink.close().await.map_err(PipelineError::SinkFailed)
    }
    .await;

    match outcome {
        Ok(()) => {
            session.complete();
            info!(
                chunks = report.chunks,
                bytes = report.bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stream completed"
            );
            Ok(report)
        }
        Err(err) => {
            session.abort();
            cancel.cancel();
            tasks.abort_all();
            warn!(
                emitted = report.chunks,
                failed_chunk = ?err.chunk_index(),
                "Stream aborted: {err}"
            );
            sink.abort(&err).await;
            Err(err)
        }
    }
}

async fn synthesize_chunk(
    backend: Arc<dyn SynthesisBackend>,
    chunk: Chunk,
    timeout: Duration,
    cancel: CancellationToken,
) -> SynthesisResult {
    let Chunk { index, text } = chunk;
    let work = AssertUnwindSafe(backend.synthesize(&text)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SynthesisError::Cancelled),
        res = tokio::time::timeout(timeout, work) => match res {
            Err(_) => Err(SynthesisError::Timeout(timeout)),
            Ok(Err(panic)) => Err(SynthesisError::TaskFailed(panic_message(&*panic))),
            Ok(Ok(Ok(bytes))) if bytes.is_empty() => Err(SynthesisError::EmptyPayload),
            Ok(Ok(res)) => res,
        },
    };

    SynthesisResult { index, outcome }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}
