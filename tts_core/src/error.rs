use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Failures of a voice synthesis session.
///
/// Every variant is terminal for the session that produced it; nothing is retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("VOICEVOX unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("VOICEVOX did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("VOICEVOX rejected the request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("VOICEVOX returned a malformed response: {0}")]
    UpstreamMalformed(String),

    #[error("Failed to persist audio: {0}")]
    PersistenceFailed(#[source] std::io::Error),

    #[error("Client cancelled the stream")]
    ClientCancelled,
}

impl RelayError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::UpstreamMalformed(err.to_string())
        } else {
            Self::UpstreamUnavailable(err.to_string())
        }
    }
}
