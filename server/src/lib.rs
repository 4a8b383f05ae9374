pub mod config;
pub mod error;
pub mod handlers;
pub mod validation;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::LlmClient;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::{AudioStore, StreamRelay, VoicevoxClient};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub voicevox: VoicevoxClient,
    pub relay: StreamRelay,
    pub store: AudioStore,
    pub llm: Arc<LlmClient>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig, llm: LlmClient) -> anyhow::Result<Self> {
        let voicevox = VoicevoxClient::new(config.voicevox.clone())
            .context("Failed to build VOICEVOX client")?;
        let store = AudioStore::new(config.audio_dir());
        let relay = StreamRelay::new(voicevox.clone(), store.clone());

        Ok(Self {
            voicevox,
            relay,
            store,
            llm: Arc::new(llm),
            config,
        })
    }
}

/// Build the full application: API routes at the root and under `/api`,
/// static files under `/static`, and the middleware stack.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;

    // Global limit shared by all clients; per-IP extraction is unreliable behind proxies
    let rate_limit = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond((60_000 / rate_limit as u64).max(1))
            .burst_size(rate_limit)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("Invalid rate limit configuration")?,
    );
    info!("Rate limiting: {} requests per minute", rate_limit);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config.cors_allowed_origins.as_deref()))
        .into_inner();

    let api = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::healthz))
        .route("/chat", post(handlers::chat))
        .route("/synthesize", post(handlers::synthesize))
        .route("/speakers", get(handlers::speakers))
        .route("/stream-voice", get(handlers::stream_voice));

    let app = Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state);

    Ok(app)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(allowed_origins) = allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

/// Tag request and response with the same `x-request-id`
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok();
    if let Some(ref id) = request_id {
        request.headers_mut().insert("x-request-id", id.clone());
    }
    let mut response = next.run(request).await;
    if let Some(id) = request_id {
        response.headers_mut().insert("x-request-id", id);
    }
    response
}
