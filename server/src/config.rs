// Configuration for the server, read once from the environment

use std::{path::PathBuf, str::FromStr, time::Duration};

use tts_core::VoicevoxConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub llm_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Served under `/static`; synthesized audio goes to its `audio` subdirectory.
    pub static_dir: PathBuf,
    /// Prefix for the absolute `audio_url` returned by `/synthesize`.
    pub public_base_url: String,
    pub voicevox: VoicevoxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            rate_limit_per_minute: 60,
            llm_timeout_secs: 30,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            static_dir: PathBuf::from("static"),
            public_base_url: "http://localhost:8000".to_string(),
            voicevox: VoicevoxConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_or("PORT", defaults.port);
        let rate_limit_per_minute = env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute);
        let llm_timeout_secs = env_or("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs);
        let request_timeout_secs = env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs);

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        let static_dir = std::env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let voicevox = VoicevoxConfig {
            base_url: std::env::var("VOICEVOX_URL").unwrap_or(defaults.voicevox.base_url),
            query_timeout: env_secs("VOICEVOX_QUERY_TIMEOUT_SECS", defaults.voicevox.query_timeout),
            synthesis_timeout: env_secs(
                "VOICEVOX_SYNTHESIS_TIMEOUT_SECS",
                defaults.voicevox.synthesis_timeout,
            ),
            stream_timeout: env_secs("VOICEVOX_STREAM_TIMEOUT_SECS", defaults.voicevox.stream_timeout),
            probe_timeout: defaults.voicevox.probe_timeout,
        };

        Self {
            port,
            rate_limit_per_minute,
            llm_timeout_secs,
            request_timeout_secs,
            cors_allowed_origins,
            static_dir,
            public_base_url,
            voicevox,
        }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.static_dir.join("audio")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
