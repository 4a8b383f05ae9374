//! HTTP client for the VOICEVOX engine.

use std::{future::Future, pin::Pin, time::Duration};

use async_stream::try_stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{RelayError, Result},
    query::{AudioQuery, SynthesisQuery},
};

pub const DEFAULT_VOICEVOX_URL: &str = "http://localhost:50021";

/// Live audio body of a `synthesis` call, one transport chunk per item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Debug, Clone)]
pub struct VoicevoxConfig {
    pub base_url: String,
    /// Bound on the `audio_query` call.
    pub query_timeout: Duration,
    /// Bound on a buffered `synthesis` call.
    pub synthesis_timeout: Duration,
    /// Bound on opening a streamed `synthesis` call and on each chunk read.
    pub stream_timeout: Duration,
    /// Bound on `speakers`.
    pub probe_timeout: Duration,
}

impl Default for VoicevoxConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_VOICEVOX_URL.to_string(),
            query_timeout: Duration::from_secs(10),
            synthesis_timeout: Duration::from_secs(15),
            stream_timeout: Duration::from_secs(20),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct AudioQueryParams<'a> {
    text: &'a str,
    speaker: i64,
}

#[derive(Serialize)]
struct SpeakerParams {
    speaker: i64,
}

#[derive(Debug, Clone)]
pub struct VoicevoxClient {
    client: Client,
    config: VoicevoxConfig,
}

impl VoicevoxClient {
    pub fn new(config: VoicevoxConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: VoicevoxConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `POST /audio_query`: build the synthesis parameter document for `query`.
    pub async fn audio_query(&self, query: &SynthesisQuery) -> Result<AudioQuery> {
        let params = AudioQueryParams {
            text: query.text(),
            speaker: query.speaker_id(),
        };

        let value = bounded(self.config.query_timeout, async {
            let response = self
                .client
                .post(self.url("audio_query"))
                .query(&params)
                .send()
                .await
                .map_err(RelayError::from_transport)?;
            let response = ensure_success(response).await?;
            response
                .json::<Value>()
                .await
                .map_err(RelayError::from_transport)
        })
        .await?;

        AudioQuery::from_value(value)
    }

    /// `POST /synthesis` without buffering: the returned stream reads the body as it arrives.
    ///
    /// Only the response headers are awaited here, so a rejected status surfaces
    /// before any audio is handed out.
    pub async fn open_synthesis(
        &self,
        query: &SynthesisQuery,
        document: &AudioQuery,
    ) -> Result<ChunkStream> {
        let limit = self.config.stream_timeout;
        let params = SpeakerParams {
            speaker: query.speaker_id(),
        };

        let response = bounded(limit, async {
            let response = self
                .client
                .post(self.url("synthesis"))
                .query(&params)
                .json(document)
                .send()
                .await
                .map_err(RelayError::from_transport)?;
            ensure_success(response).await
        })
        .await?;

        debug!(status = %response.status(), "VOICEVOX synthesis stream opened");
        Ok(Box::pin(body_chunks(response, limit)))
    }

    /// Run both calls and buffer the whole clip.
    pub async fn synthesize(&self, query: &SynthesisQuery) -> Result<Bytes> {
        let mut document = self.audio_query(query).await?;
        document.apply(query);

        let params = SpeakerParams {
            speaker: query.speaker_id(),
        };
        bounded(self.config.synthesis_timeout, async {
            let response = self
                .client
                .post(self.url("synthesis"))
                .query(&params)
                .json(&document)
                .send()
                .await
                .map_err(RelayError::from_transport)?;
            let response = ensure_success(response).await?;
            response.bytes().await.map_err(RelayError::from_transport)
        })
        .await
    }

    /// `GET /speakers`, passed through as VOICEVOX describes them.
    pub async fn speakers(&self) -> Result<Vec<Value>> {
        bounded(self.config.probe_timeout, async {
            let response = self
                .client
                .get(self.url("speakers"))
                .send()
                .await
                .map_err(RelayError::from_transport)?;
            let response = ensure_success(response).await?;
            response
                .json::<Vec<Value>>()
                .await
                .map_err(RelayError::from_transport)
        })
        .await
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RelayError::UpstreamTimeout(limit))?
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RelayError::UpstreamRejected {
        status: status.as_u16(),
        body,
    })
}

fn body_chunks(response: Response, limit: Duration) -> impl Stream<Item = Result<Bytes>> + Send {
    try_stream! {
        let mut body = std::pin::pin!(response.bytes_stream());
        loop {
            let next = tokio::time::timeout(limit, body.next())
                .await
                .map_err(|_| RelayError::UpstreamTimeout(limit))?;
            match next {
                Some(chunk) => {
                    let chunk = chunk.map_err(RelayError::from_transport)?;
                    yield chunk;
                }
                None => break,
            }
        }
    }
}
