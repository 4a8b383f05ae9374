//! End-to-end tests for the streaming voice relay

mod common;

use axum::http::{header, StatusCode};
use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{any, body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use common::*;

#[tokio::test]
async fn test_stream_voice_relays_and_persists() {
    let app = spawn_app().await;
    let audio = fake_wav(256 * 1024);
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .and(query_param("text", "こんにちは"))
        .and(query_param("speaker", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"speedScale": 1.0})))
        .expect(1)
        .mount(&app.voicevox)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .and(query_param("speaker", "6"))
        .and(body_partial_json(json!({"speedScale": 1.0, "outputStereo": false})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio.clone()))
        .expect(1)
        .mount(&app.voicevox)
        .await;

    let response = app
        .get(&format!("/stream-voice?text={KONNICHIWA}&speaker=6&speed=1.0"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    let body = body_bytes(response).await;
    assert!(!body.is_empty());
    assert_eq!(body, audio);

    let files = app.audio_files("temp_stream_");
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::metadata(&files[0]).unwrap().len(), body.len() as u64);
    assert_eq!(std::fs::read(&files[0]).unwrap(), body);
}

#[tokio::test]
async fn test_stream_voice_defaults_speaker_and_speed() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/audio_query"))
        .and(query_param("speaker", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&app.voicevox)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .and(body_partial_json(json!({"speedScale": 1.0})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fake_wav(64)))
        .expect(1)
        .mount(&app.voicevox)
        .await;

    let response = app.get(&format!("/stream-voice?text={KONNICHIWA}")).await;
    assert_eq!(body_bytes(response).await, fake_wav(64));
}

#[tokio::test]
async fn test_whitespace_text_never_reaches_voicevox() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.voicevox)
        .await;

    for uri in ["/stream-voice?text=", "/stream-voice?text=%20%20%20", "/stream-voice?text=%E3%80%80"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("empty"));
    }
    assert!(app.audio_files("").is_empty());
}

#[tokio::test]
async fn test_missing_text_is_rejected() {
    let app = spawn_app().await;
    let response = app.get("/stream-voice?speaker=6").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_build_failure_yields_empty_body() {
    let app = spawn_app().await;
    app.mount_audio_query(500).await;
    Mock::given(method("POST"))
        .and(path("/synthesis"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.voicevox)
        .await;

    let response = app.get(&format!("/stream-voice?text={KONNICHIWA}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert!(app.audio_files("temp_stream_").is_empty());
}

#[tokio::test]
async fn test_client_disconnect_keeps_partial_file() {
    let app = spawn_app().await;
    app.mount_audio_query(200).await;
    app.mount_synthesis(fake_wav(512 * 1024)).await;

    let response = app.get(&format!("/stream-voice?text={KONNICHIWA}")).await;
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    drop(body);

    let files = app.audio_files("temp_stream_");
    assert_eq!(files.len(), 1);
    let persisted = std::fs::read(&files[0]).unwrap();
    assert_eq!(persisted, first.to_vec());
}

#[tokio::test]
async fn test_identical_requests_write_distinct_files() {
    let app = spawn_app().await;
    app.mount_audio_query(200).await;
    app.mount_synthesis(fake_wav(1024)).await;

    let uri = format!("/stream-voice?text={KONNICHIWA}&speaker=6&speed=1.0");
    let (first, second) = tokio::join!(app.get(&uri), app.get(&uri));
    let (first, second) = tokio::join!(body_bytes(first), body_bytes(second));

    assert_eq!(first, second);
    let files = app.audio_files("temp_stream_");
    assert_eq!(files.len(), 2);
    for file in files {
        assert_eq!(std::fs::read(file).unwrap(), first);
    }
}
