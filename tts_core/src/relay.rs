//! Stream relay controller: `audio_query` → streamed `synthesis` → tee → caller.

use std::{convert::Infallible, path::PathBuf, pin::Pin, sync::Arc, time::Instant};

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    client::VoicevoxClient,
    error::{RelayError, Result},
    query::SynthesisQuery,
    storage::AudioStore,
    tee::{StreamSession, TeeWriter},
};

/// Audio body handed to the HTTP layer. It never yields an error: any failure
/// simply ends it early.
pub type AudioStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, Infallible>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    QueryBuilding,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Latest known state of one relay session, published on every transition.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: SessionState,
    pub path: Option<PathBuf>,
    pub chunk_count: u64,
    pub bytes_forwarded: u64,
    pub error: Option<Arc<RelayError>>,
}

impl SessionReport {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            path: None,
            chunk_count: 0,
            bytes_forwarded: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamRelay {
    client: VoicevoxClient,
    store: AudioStore,
}

impl StreamRelay {
    pub fn new(client: VoicevoxClient, store: AudioStore) -> Self {
        Self { client, store }
    }

    /// Start a session for `query`.
    ///
    /// The session runs lazily as the returned stream is polled; dropping the
    /// stream cancels it. The receiver observes the session's state.
    pub fn start(&self, query: SynthesisQuery) -> (AudioStream, watch::Receiver<SessionReport>) {
        let (tx, rx) = watch::channel(SessionReport::idle());
        let mut tracker = SessionTracker::new(tx);
        let client = self.client.clone();
        let store = self.store.clone();

        let audio = stream! {
            tracker.transition(SessionState::QueryBuilding);
            info!(
                session = %tracker.id,
                text_len = query.text().chars().count(),
                speaker = query.speaker_id(),
                speed = query.speed_scale(),
                "Starting voice stream"
            );

            let (path, chunks) = match open_session(&client, &store, query).await {
                Ok(opened) => opened,
                Err(err) => {
                    tracker.fail(err);
                    return;
                }
            };
            tracker.report.path = Some(path);
            tracker.transition(SessionState::Synthesizing);

            let mut chunks = std::pin::pin!(chunks);
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        tracker.record(chunk.len());
                        yield Ok::<Bytes, Infallible>(chunk);
                    }
                    Err(err) => {
                        tracker.fail(err);
                        return;
                    }
                }
            }
            tracker.complete();
        };

        (Box::pin(audio), rx)
    }
}

async fn open_session(
    client: &VoicevoxClient,
    store: &AudioStore,
    query: SynthesisQuery,
) -> Result<(PathBuf, impl Stream<Item = Result<Bytes>> + Send + 'static)> {
    let mut document = client.audio_query(&query).await?;
    document.apply(&query);
    let source = client.open_synthesis(&query, &document).await?;

    // Created only once VOICEVOX has accepted the synthesis request.
    let (path, file) = store.create_stream_file().await?;
    let session = StreamSession::new(query, path.clone());
    Ok((path, TeeWriter::new(source, file, session).into_stream()))
}

/// Publishes state transitions and logs the terminal one. Marks the session
/// cancelled if dropped before reaching a terminal state.
struct SessionTracker {
    id: String,
    started: Instant,
    report: SessionReport,
    tx: watch::Sender<SessionReport>,
}

impl SessionTracker {
    fn new(tx: watch::Sender<SessionReport>) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            started: Instant::now(),
            report: SessionReport::idle(),
            tx,
        }
    }

    fn transition(&mut self, state: SessionState) {
        self.report.state = state;
        self.tx.send_replace(self.report.clone());
    }

    fn record(&mut self, len: usize) {
        self.report.chunk_count += 1;
        self.report.bytes_forwarded += len as u64;
    }

    fn fail(&mut self, err: RelayError) {
        error!(
            session = %self.id,
            state = ?self.report.state,
            chunks = self.report.chunk_count,
            bytes = self.report.bytes_forwarded,
            "Voice stream failed: {err}"
        );
        self.report.error = Some(Arc::new(err));
        self.transition(SessionState::Failed);
    }

    fn complete(&mut self) {
        info!(
            session = %self.id,
            chunks = self.report.chunk_count,
            bytes = self.report.bytes_forwarded,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            path = ?self.report.path,
            "Voice stream completed"
        );
        self.transition(SessionState::Completed);
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        if self.report.state.is_terminal() {
            return;
        }
        warn!(
            session = %self.id,
            state = ?self.report.state,
            chunks = self.report.chunk_count,
            bytes = self.report.bytes_forwarded,
            "Voice stream dropped by client"
        );
        self.report.error = Some(Arc::new(RelayError::ClientCancelled));
        self.transition(SessionState::Cancelled);
    }
}
