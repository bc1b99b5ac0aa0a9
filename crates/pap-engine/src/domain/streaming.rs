//! # Streaming Response Assembler
//!
//! Turns the `response` envelopes of one correlation into a lazy, ordered,
//! finite chunk stream for the waiting consumer.
//!
//! - Chunks are forwarded in the order `append` is called; nothing is reordered.
//! - At most one append may be final. Anything after it is `CONFLICT`.
//! - The stream can be taken once. Finished state is kept as a tombstone
//!   until `evict`, so late appends are still recognised.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pap_types::{OutputChunk, PapError};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, trace};

use super::config::add;
use super::errors::StreamError;

/// One item of a chunk stream. An `Err` is always the last item.
pub type ChunkItem = Result<OutputChunk, PapError>;

struct StreamState {
    sender: Option<mpsc::UnboundedSender<ChunkItem>>,
    receiver: Option<mpsc::UnboundedReceiver<ChunkItem>>,
    /// Set once the final chunk, an error or a close has been seen.
    finished_at: Option<DateTime<Utc>>,
    chunks: u64,
}

impl StreamState {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            finished_at: None,
            chunks: 0,
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.sender = None;
        self.finished_at.get_or_insert(now);
    }
}

/// What an append did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Chunks forwarded by this call.
    pub appended: usize,
    /// Whether this call finished the stream.
    pub finished: bool,
}

pub struct StreamAssembler {
    streams: DashMap<String, StreamState>,
    retention: Duration,
}

impl StreamAssembler {
    /// `retention` bounds how long finished streams are remembered.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            streams: DashMap::new(),
            retention,
        }
    }

    /// Start a stream for `correlation_id`. No-op if one exists.
    pub fn open(&self, correlation_id: &str) {
        self.streams
            .entry(correlation_id.to_string())
            .or_insert_with(StreamState::new);
    }

    /// Forward `chunks` in order; finish the stream when `is_final`.
    ///
    /// Opens the stream if it was never opened.
    pub fn append(
        &self,
        correlation_id: &str,
        chunks: &[OutputChunk],
        is_final: bool,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome, StreamError> {
        let mut state = self
            .streams
            .entry(correlation_id.to_string())
            .or_insert_with(StreamState::new);

        let Some(sender) = state.sender.as_ref() else {
            return Err(StreamError::AlreadyFinished(correlation_id.to_string()));
        };

        for chunk in chunks {
            // A dropped consumer is not an error for the producer.
            let _ = sender.send(Ok(chunk.clone()));
        }
        state.chunks += chunks.len() as u64;

        if is_final {
            state.finish(now);
            debug!(correlation_id, chunks = state.chunks, "Stream finished");
        } else {
            trace!(correlation_id, appended = chunks.len(), "Chunks appended");
        }

        Ok(AppendOutcome {
            appended: chunks.len(),
            finished: is_final,
        })
    }

    /// End the stream with `error` as its last item.
    pub fn abort(&self, correlation_id: &str, error: PapError, now: DateTime<Utc>) {
        if let Some(mut state) = self.streams.get_mut(correlation_id) {
            if let Some(sender) = state.sender.as_ref() {
                let _ = sender.send(Err(error));
            }
            state.finish(now);
        }
    }

    /// End the stream without a terminal item.
    pub fn close(&self, correlation_id: &str, now: DateTime<Utc>) {
        if let Some(mut state) = self.streams.get_mut(correlation_id) {
            state.finish(now);
        }
    }

    /// Hand out the consumer side. `None` if unknown or already taken.
    pub fn take_stream(&self, correlation_id: &str) -> Option<ChunkStream> {
        let receiver = self.streams.get_mut(correlation_id)?.receiver.take()?;
        Some(ChunkStream {
            correlation_id: correlation_id.to_string(),
            receiver,
        })
    }

    #[must_use]
    pub fn is_finished(&self, correlation_id: &str) -> bool {
        self.streams
            .get(correlation_id)
            .is_some_and(|state| state.finished_at.is_some())
    }

    /// Forget finished streams older than the retention period.
    pub fn evict(&self, now: DateTime<Utc>) -> usize {
        let before = self.streams.len();
        let retention = self.retention;
        self.streams.retain(|_, state| match state.finished_at {
            Some(at) => add(at, retention) > now,
            None => true,
        });
        before.saturating_sub(self.streams.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Consumer side of one correlation's chunks.
///
/// Ends after the final chunk, after an error item, or when the stream is
/// closed by a cancel.
pub struct ChunkStream {
    correlation_id: String,
    receiver: mpsc::UnboundedReceiver<ChunkItem>,
}

impl ChunkStream {
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Next item, or `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<ChunkItem> {
        self.receiver.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = ChunkItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
