use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{env, fs};

/// Reply when no API key is configured for the selected provider.
pub const FALLBACK_MISSING_KEY: &str = "APIキーが設定されてない。話にならない。";
/// Reply when the model answers with nothing.
pub const FALLBACK_EMPTY: &str = "...何も言うことないし。";
/// Reply when the completion call fails.
pub const FALLBACK_ERROR: &str = "何か問題があるみたい。私に聞かれても知らないけど。";

/// Built-in persona, overridable with `SYSTEM_PROMPT_FILE`.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../prompts/system_prompt.txt");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAI,
}

impl LlmProvider {
    /// Parse `LLM_PROVIDER`; anything unrecognised selects Gemini.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAI,
            _ => Self::Gemini,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::OpenAI => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenAI => "https://api.openai.com/v1",
        }
    }

    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u16,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            max_output_tokens: 150,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub generation: GenerationConfig,
}

impl LlmConfig {
    pub fn new(provider: LlmProvider, api_key: Option<String>) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation: GenerationConfig::default(),
        }
    }

    /// Read `LLM_PROVIDER`, `LLM_MODEL`, `LLM_BASE_URL`, the provider's API key
    /// variable and `SYSTEM_PROMPT_FILE`.
    pub fn from_env() -> Result<Self> {
        let provider = LlmProvider::from_name(
            &env::var("LLM_PROVIDER").unwrap_or_else(|_| "gemini".into()),
        );
        let api_key = env::var(provider.api_key_var())
            .ok()
            .filter(|key| !key.trim().is_empty());

        let mut config = Self::new(provider, api_key);
        if let Ok(model) = env::var("LLM_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = env::var("LLM_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(path) = env::var("SYSTEM_PROMPT_FILE") {
            config.system_prompt = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read system prompt from {path}"))?;
        }
        Ok(config)
    }
}

// Gemini generateContent

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u16,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

// OpenAI chat completions

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u16,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Send the system prompt and one user message, returning the trimmed completion.
    pub async fn chat(&self, user_message: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", self.config.provider.api_key_var()))?;

        let reply = match self.config.provider {
            LlmProvider::Gemini => self.chat_gemini(api_key, user_message).await?,
            LlmProvider::OpenAI => self.chat_openai(api_key, user_message).await?,
        };
        Ok(reply.trim().to_string())
    }

    /// Like [`chat`](Self::chat), but every failure becomes one of the fixed fallback replies.
    pub async fn reply(&self, user_message: &str) -> String {
        if !self.is_configured() {
            tracing::warn!("{} not set, answering with fallback", self.config.provider.api_key_var());
            return FALLBACK_MISSING_KEY.to_string();
        }

        match self.chat(user_message).await {
            Ok(reply) if reply.is_empty() => FALLBACK_EMPTY.to_string(),
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("LLM error: {e:#}");
                FALLBACK_ERROR.to_string()
            }
        }
    }

    async fn chat_gemini(&self, api_key: &str, user_message: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let generation = self.config.generation;
        let req_body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: &self.config.system_prompt,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: user_message }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: generation.temperature,
                top_p: generation.top_p,
                max_output_tokens: generation.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&req_body)
            .send()
            .await
            .context("Gemini request failed")?
            .error_for_status()? // convert non-200 into error
            .json::<GeminiResponse>()
            .await
            .context("Gemini response is not valid JSON")?;

        let reply = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        Ok(reply)
    }

    async fn chat_openai(&self, api_key: &str, user_message: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let generation = self.config.generation;
        let req_body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message { role: "system", content: &self.config.system_prompt },
                Message { role: "user", content: user_message },
            ],
            max_tokens: generation.max_output_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&req_body)
            .send()
            .await
            .context("OpenAI request failed")?
            .error_for_status()?
            .json::<ChatResponse>()
            .await
            .context("OpenAI response is not valid JSON")?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(reply)
    }
}
