//! Persist-then-forward fan-out of an upstream chunk stream.

use std::path::{Path, PathBuf};

use async_stream::try_stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::{
    error::{RelayError, Result},
    query::SynthesisQuery,
};

/// Per-session bookkeeping, owned by exactly one tee.
#[derive(Debug, Clone)]
pub struct StreamSession {
    query: SynthesisQuery,
    path: PathBuf,
    bytes_written: u64,
    chunk_count: u64,
}

impl StreamSession {
    pub fn new(query: SynthesisQuery, path: impl Into<PathBuf>) -> Self {
        Self {
            query,
            path: path.into(),
            bytes_written: 0,
            chunk_count: 0,
        }
    }

    pub fn query(&self) -> &SynthesisQuery {
        &self.query
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    fn record(&mut self, len: usize) {
        self.chunk_count += 1;
        self.bytes_written += len as u64;
    }
}

/// Writes every chunk of `source` to `sink` before handing it on.
///
/// The returned stream pulls from `source` only when it is itself polled, so a
/// slow consumer holds back the upstream read and at most one chunk is in
/// flight. Dropping the stream drops both `source` and `sink`.
pub struct TeeWriter<S, W> {
    source: S,
    sink: W,
    session: StreamSession,
}

impl<S, W> TeeWriter<S, W>
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(source: S, sink: W, session: StreamSession) -> Self {
        Self {
            source,
            sink,
            session,
        }
    }

    /// Every `Ok` chunk yielded has already been written and flushed to the sink.
    ///
    /// The first error ends the stream: a failed write yields
    /// [`RelayError::PersistenceFailed`] in place of the chunk, which is not forwarded.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        let Self {
            source,
            mut sink,
            mut session,
        } = self;

        try_stream! {
            let mut source = std::pin::pin!(source);
            while let Some(chunk) = source.next().await {
                let chunk = chunk?;
                if chunk.is_empty() {
                    continue;
                }

                sink.write_all(&chunk).await.map_err(RelayError::PersistenceFailed)?;
                sink.flush().await.map_err(RelayError::PersistenceFailed)?;
                session.record(chunk.len());
                debug!(
                    path = %session.path().display(),
                    chunk = session.chunk_count(),
                    size = chunk.len(),
                    total = session.bytes_written(),
                    "Persisted chunk"
                );

                yield chunk;
            }

            sink.shutdown().await.map_err(RelayError::PersistenceFailed)?;
            info!(
                path = %session.path().display(),
                chunks = session.chunk_count(),
                bytes = session.bytes_written(),
                "Saved streamed audio"
            );
        }
    }
}
