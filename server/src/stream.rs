//! Chunked HTTP body fed by the synthesis pipeline.
//!
//! Every flush becomes exactly one body frame, so a chunk's audio reaches the
//! client whole. Closing drops the sender and hyper finishes the chunked
//! response normally. Aborting pushes an error into the body instead, which
//! makes hyper cut the connection without the terminating zero-length chunk:
//! a client can tell a truncated stream from a complete one.
//!
//! A container header set with [`ChannelSink::preamble`] goes out in front of
//! the first frame.

use std::io;

use async_trait::async_trait;
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use speech_core::{PipelineError, StreamReport, StreamWriter};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type Frame = Result<Bytes, io::Error>;

pub struct ChannelSink {
    tx: Option<mpsc::Sender<Frame>>,
    buf: BytesMut,
    // chunk bytes in `buf`, preamble excluded
    pending: u64,
    sent: StreamReport,
}

impl ChannelSink {
    /// A sink and the response body it feeds. `capacity` is the number of
    /// chunks buffered before `flush` waits on the client.
    pub fn channel(capacity: usize) -> (Self, Body) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx: Some(tx),
            buf: BytesMut::new(),
            pending: 0,
            sent: StreamReport::default(),
        };
        (sink, Body::from_stream(ReceiverStream::new(rx)))
    }

    /// Queue bytes to lead the next frame without counting them as a chunk.
    pub fn preamble(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Chunks and chunk bytes handed to the body so far.
    pub fn sent(&self) -> StreamReport {
        self.sent
    }

    fn closed() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
    }
}

#[async_trait]
impl StreamWriter for ChannelSink {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.tx.is_none() {
            return Err(Self::closed());
        }
        self.buf.extend_from_slice(bytes);
        self.pending += bytes.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let tx = self.tx.as_ref().ok_or_else(Self::closed)?;
        let frame = self.buf.split().freeze();
        tx.send(Ok(frame)).await.map_err(|_| Self::closed())?;
        if self.pending > 0 {
            self.sent.chunks += 1;
            self.sent.bytes += self.pending;
            self.pending = 0;
        }
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.flush().await?;
        self.tx = None;
        Ok(())
    }

    async fn abort(&mut self, reason: &PipelineError) {
        self.buf.clear();
        self.pending = 0;
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(io::Error::other(reason.to_string()))).await;
        }
    }
}
