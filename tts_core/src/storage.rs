//! Naming and creation of audio files under the configured audio directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{RelayError, Result};

/// Directory that receives synthesized audio, shared read-only across sessions.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Create a fresh file for one streaming session.
    ///
    /// Opened with `create_new`, so a name collision fails instead of
    /// truncating another session's audio.
    pub async fn create_stream_file(&self) -> Result<(PathBuf, fs::File)> {
        let path = self.dir.join(stream_file_name(Utc::now()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(RelayError::PersistenceFailed)?;
        Ok((path, file))
    }

    /// Write a fully synthesized clip and return its file name.
    pub async fn save_voice(&self, text: &str, audio: &[u8]) -> Result<String> {
        let file_name = voice_file_name(text, Utc::now());
        let mut file = fs::File::create(self.dir.join(&file_name))
            .await
            .map_err(RelayError::PersistenceFailed)?;
        file.write_all(audio)
            .await
            .map_err(RelayError::PersistenceFailed)?;
        file.flush().await.map_err(RelayError::PersistenceFailed)?;
        Ok(file_name)
    }
}

/// `temp_stream_<utc timestamp>_<suffix>.wav`
pub fn stream_file_name(now: DateTime<Utc>) -> String {
    format!("temp_stream_{}_{}.wav", file_timestamp(now), short_id())
}

/// `voice_<text hash>_<utc timestamp>.wav`
pub fn voice_file_name(text: &str, now: DateTime<Utc>) -> String {
    format!("voice_{}_{}.wav", text_hash(text), file_timestamp(now))
}

/// First 8 hex digits of the SHA-256 of `text`.
pub fn text_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..4])
}

fn file_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%6f").to_string()
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
