use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use tts_core::{RelayError, SynthesisQuery, DEFAULT_SPEAKER, DEFAULT_SPEED};

use crate::{
    error::ApiError,
    validation::{validate_chat_request, validate_conversation_id, validate_tts_request},
    AppState,
};

fn default_speaker() -> i64 {
    DEFAULT_SPEAKER
}

fn default_speed() -> f64 {
    DEFAULT_SPEED
}

#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    conversation_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    response: String,
    conversation_id: String,
    audio_url: Option<String>,
}

#[derive(Deserialize)]
pub struct VoiceRequest {
    text: String,
    #[serde(default = "default_speaker")]
    speaker: i64,
    #[serde(default = "default_speed")]
    speed: f64,
}

#[derive(Serialize)]
pub struct VoiceResponse {
    audio_path: String,
    audio_url: String,
}

#[derive(Deserialize)]
pub struct StreamVoiceParams {
    text: String,
    #[serde(default = "default_speaker")]
    speaker: i64,
    #[serde(default = "default_speed")]
    speed: f64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    api: &'static str,
    llm_service: String,
    voicevox: &'static str,
    voicevox_speakers_count: usize,
}

pub async fn root() -> Json<Value> {
    Json(serde_json::json!({
        "message": "Cold Bot API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.llm.provider().name();
    let llm_service = if state.llm.is_configured() {
        format!("{provider}_configured")
    } else {
        format!("{provider}_not_configured")
    };

    let (voicevox, voicevox_speakers_count) = match state.voicevox.speakers().await {
        Ok(speakers) => ("connected", speakers.len()),
        Err(RelayError::UpstreamRejected { .. } | RelayError::UpstreamMalformed(_)) => ("error", 0),
        Err(_) => ("disconnected", 0),
    };

    Json(HealthResponse {
        api: "running",
        llm_service,
        voicevox,
        voicevox_speakers_count,
    })
}

pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    validate_chat_request(&req.message)?;
    if let Some(ref id) = req.conversation_id {
        validate_conversation_id(id)?;
    }

    info!(
        "Chat request received: message length={}, conv_id={:?}",
        req.message.chars().count(),
        req.conversation_id
    );
    let start_time = Instant::now();

    let reply = match tokio::time::timeout(state.config.llm_timeout(), state.llm.reply(&req.message)).await {
        Ok(reply) => reply,
        Err(_) => {
            error!(
                "LLM request timed out after {} seconds",
                state.config.llm_timeout().as_secs()
            );
            llm_core::FALLBACK_ERROR.to_string()
        }
    };
    info!(
        "LLM response received in {:.2}s, reply length={}",
        start_time.elapsed().as_secs_f64(),
        reply.chars().count()
    );

    let conversation_id = req
        .conversation_id
        .unwrap_or_else(|| format!("conv_{}", uuid::Uuid::new_v4().simple()));

    Ok(Json(ChatResponse {
        response: reply,
        conversation_id,
        audio_url: None,
    }))
}

pub async fn synthesize(
    State(state): State<AppState>,
    Json(req): Json<VoiceRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    validate_tts_request(&req.text)?;
    let query = SynthesisQuery::new(req.text, req.speaker, req.speed)?;

    let audio = state.voicevox.synthesize(&query).await?;
    let file_name = state.store.save_voice(query.text(), &audio).await?;
    info!("Saved {} bytes of audio to {}", audio.len(), file_name);

    let audio_path = format!("/static/audio/{file_name}");
    let audio_url = format!(
        "{}{}",
        state.config.public_base_url.trim_end_matches('/'),
        audio_path
    );

    Ok(Json(VoiceResponse {
        audio_path,
        audio_url,
    }))
}

pub async fn speakers(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    Ok(Json(state.voicevox.speakers().await?))
}

/// Relay VOICEVOX audio to the client while it is being synthesized.
///
/// Once this returns, the status and content type are committed; later
/// failures only cut the body short and are reported in the logs.
pub async fn stream_voice(
    State(state): State<AppState>,
    Query(params): Query<StreamVoiceParams>,
) -> Result<Response, ApiError> {
    validate_tts_request(&params.text)?;
    let query = SynthesisQuery::new(params.text, params.speaker, params.speed)?;

    let (audio, _report) = state.relay.start(query);
    Ok(([(header::CONTENT_TYPE, "audio/wav")], Body::from_stream(audio)).into_response())
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
