//! Common utilities for integration tests

#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use llm_core::{LlmClient, LlmConfig, LlmProvider};
use serde_json::json;
use server::{build_router, config::ServerConfig, AppState};
use tempfile::TempDir;
use tower::ServiceExt;
use tts_core::VoicevoxConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PUBLIC_BASE_URL: &str = "http://relay.test";

/// `こんにちは`, percent-encoded for query strings
pub const KONNICHIWA: &str = "%E3%81%93%E3%82%93%E3%81%AB%E3%81%A1%E3%81%AF";

pub struct TestApp {
    pub router: Router,
    pub voicevox: MockServer,
    pub llm: MockServer,
    pub static_dir: TempDir,
}

/// App wired to mock VOICEVOX and Gemini servers with an API key set
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Some("test-key"), None).await
}

/// `voicevox_url` overrides the mock VOICEVOX address, e.g. to point at a dead port
pub async fn spawn_app_with(api_key: Option<&str>, voicevox_url: Option<&str>) -> TestApp {
    let voicevox = MockServer::start().await;
    let llm = MockServer::start().await;
    let static_dir = tempfile::tempdir().unwrap();

    let config = ServerConfig {
        static_dir: static_dir.path().to_path_buf(),
        public_base_url: PUBLIC_BASE_URL.to_string(),
        voicevox: VoicevoxConfig {
            base_url: voicevox_url.map(str::to_string).unwrap_or_else(|| voicevox.uri()),
            query_timeout: Duration::from_secs(1),
            synthesis_timeout: Duration::from_secs(1),
            stream_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
        },
        ..ServerConfig::default()
    };

    let mut llm_config = LlmConfig::new(LlmProvider::Gemini, api_key.map(str::to_string));
    llm_config.base_url = llm.uri();

    let state = AppState::new(config, LlmClient::new(llm_config)).unwrap();
    state.store.ensure_dir().await.unwrap();
    let router = build_router(state).unwrap();

    TestApp {
        router,
        voicevox,
        llm,
        static_dir,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.static_dir.path().join("audio")
    }

    /// Files in the audio directory whose name starts with `prefix`
    pub fn audio_files(&self, prefix: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.audio_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .collect();
        files.sort();
        files
    }

    pub async fn mount_audio_query(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/audio_query"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "accent_phrases": [],
                "speedScale": 1.0,
                "pitchScale": 0.0,
                "outputStereo": false
            })))
            .mount(&self.voicevox)
            .await;
    }

    pub async fn mount_synthesis(&self, audio: Vec<u8>) {
        Mock::given(method("POST"))
            .and(path("/synthesis"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/wav")
                    .set_body_bytes(audio),
            )
            .mount(&self.voicevox)
            .await;
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Deterministic fake WAV payload of `len` bytes
pub fn fake_wav(len: usize) -> Vec<u8> {
    let mut audio = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
    audio.extend((0..len.saturating_sub(audio.len())).map(|i| (i % 251) as u8));
    audio
}
