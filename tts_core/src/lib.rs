//! VOICEVOX synthesis: upstream client, tee persistence and the streaming relay.

pub mod client;
pub mod error;
pub mod query;
pub mod relay;
pub mod storage;
pub mod tee;

#[cfg(test)]
mod test_support;

pub use client::{ChunkStream, VoicevoxClient, VoicevoxConfig, DEFAULT_VOICEVOX_URL};
pub use error::{RelayError, Result};
pub use query::{AudioQuery, SynthesisQuery, DEFAULT_SPEAKER, DEFAULT_SPEED};
pub use relay::{AudioStream, SessionReport, SessionState, StreamRelay};
pub use storage::AudioStore;
pub use tee::{StreamSession, TeeWriter};
