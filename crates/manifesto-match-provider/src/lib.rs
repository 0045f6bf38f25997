//! Hosted text-generation backends behind the core [`TextGenerator`] seam.
//!
//! Each adapter speaks one vendor's JSON-over-HTTPS protocol with a blocking
//! `ureq` agent. Response decoding lives in pure `extract_*` functions so it can
//! be tested without a network.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use manifesto_match_core::{GenerationError, TextGenerator};
use serde_json::{json, Value};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    /// Resolution order used by [`ProviderConfig::from_env`].
    pub const ALL: [Self; 3] = [Self::OpenAi, Self::Anthropic, Self::Google];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "google" | "gemini" => Some(Self::Google),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Google => "gemini-pro-latest",
        }
    }

    #[must_use]
    pub fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }

    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("missing api key: set {0}")]
    MissingApiKey(&'static str),
    #[error("no provider configured: set one of OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_API_KEY")]
    NoProviderConfigured,
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingApiKey(_)
            | ProviderError::NoProviderConfigured
            | ProviderError::UnknownProvider(_) => Self::Unavailable(err.to_string()),
            ProviderError::Http { .. }
            | ProviderError::Transport(_)
            | ProviderError::InvalidResponse(_) => Self::Failed(err.to_string()),
        }
    }
}

#[derive(Clone, Eq, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Debug for ProviderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// First provider whose API key is present in the environment.
    ///
    /// # Errors
    /// Returns [`ProviderError::NoProviderConfigured`] when no key is set.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// # Errors
    /// Returns [`ProviderError::MissingApiKey`] when the provider's key is not set.
    pub fn from_env_for(kind: ProviderKind) -> Result<Self, ProviderError> {
        Self::from_lookup_for(kind, |name| std::env::var(name).ok())
    }

    /// # Errors
    /// Returns [`ProviderError::NoProviderConfigured`] when `lookup` yields no key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProviderError> {
        ProviderKind::ALL
            .iter()
            .find_map(|kind| Self::from_lookup_for(*kind, &lookup).ok())
            .ok_or(ProviderError::NoProviderConfigured)
    }

    /// # Errors
    /// Returns [`ProviderError::MissingApiKey`] when `lookup` yields no key for `kind`.
    pub fn from_lookup_for(
        kind: ProviderKind,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        lookup(kind.api_key_env())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(|key| Self::new(kind, key))
            .ok_or(ProviderError::MissingApiKey(kind.api_key_env()))
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url, self.kind.default_base_url());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn normalize_base_url(base_url: &str, default: &str) -> String {
    let mut url = base_url.trim().to_string();
    if url.is_empty() {
        url = default.to_string();
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{url}");
    }
    url.trim_end_matches('/').to_string()
}

fn agent_for(config: &ProviderConfig) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(config.timeout).build()
}

fn post_json(request: ureq::Request, body: &Value) -> Result<Value, ProviderError> {
    match request.send_json(body) {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|err| ProviderError::InvalidResponse(err.to_string())),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(ProviderError::Http { status, body: truncate_body(&body) })
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(ProviderError::Transport(transport.to_string()))
        }
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}

fn required_text(text: Option<&str>, shape: &str) -> Result<String, ProviderError> {
    text.map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("missing {shape}")))
}

/// # Errors
/// Returns [`ProviderError::InvalidResponse`] when `choices[0].message.content` is absent.
pub fn extract_openai_text(body: &Value) -> Result<String, ProviderError> {
    required_text(
        body.pointer("/choices/0/message/content").and_then(Value::as_str),
        "choices[0].message.content",
    )
}

/// Concatenates every `text` block of an Anthropic messages response.
///
/// # Errors
/// Returns [`ProviderError::InvalidResponse`] when the response has no text block.
pub fn extract_anthropic_text(body: &Value) -> Result<String, ProviderError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if blocks.is_empty() {
        return Err(ProviderError::InvalidResponse("missing content[].text".to_string()));
    }
    Ok(blocks.concat())
}

/// # Errors
/// Returns [`ProviderError::InvalidResponse`] when the first candidate has no text parts.
pub fn extract_gemini_text(body: &Value) -> Result<String, ProviderError> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts.iter().filter_map(|part| part.get("text").and_then(Value::as_str)).collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if parts.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "missing candidates[0].content.parts[].text".to_string(),
        ));
    }
    Ok(parts.concat())
}

#[must_use]
pub fn openai_request_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
    })
}

#[must_use]
pub fn anthropic_request_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "messages": [{"role": "user", "content": prompt}],
    })
}

#[must_use]
pub fn gemini_request_body(prompt: &str) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
    })
}

pub struct OpenAiGenerator {
    config: ProviderConfig,
    agent: ureq::Agent,
}

impl OpenAiGenerator {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let agent = agent_for(&config);
        Self { config, agent }
    }

    fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.config.api_key));
        let body = post_json(request, &openai_request_body(&self.config.model, prompt))?;
        extract_openai_text(&body)
    }
}

impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        ProviderKind::OpenAi.as_str()
    }

    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(self.call(prompt)?)
    }
}

pub struct AnthropicGenerator {
    config: ProviderConfig,
    agent: ureq::Agent,
}

impl AnthropicGenerator {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let agent = agent_for(&config);
        Self { config, agent }
    }

    fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let request = self
            .agent
            .post(&url)
            .set("x-api-key", &self.config.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION);
        let body = post_json(request, &anthropic_request_body(&self.config.model, prompt))?;
        extract_anthropic_text(&body)
    }
}

impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        ProviderKind::Anthropic.as_str()
    }

    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(self.call(prompt)?)
    }
}

pub struct GeminiGenerator {
    config: ProviderConfig,
    agent: ureq::Agent,
}

impl GeminiGenerator {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let agent = agent_for(&config);
        Self { config, agent }
    }

    fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let url =
            format!("{}/v1beta/models/{}:generateContent", self.config.base_url, self.config.model);
        let request = self.agent.post(&url).set("x-goog-api-key", &self.config.api_key);
        let body = post_json(request, &gemini_request_body(prompt))?;
        extract_gemini_text(&body)
    }
}

impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        ProviderKind::Google.as_str()
    }

    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        Ok(self.call(prompt)?)
    }
}

#[must_use]
pub fn build_generator(config: ProviderConfig) -> Arc<dyn TextGenerator> {
    tracing::info!(provider = config.kind.as_str(), model = %config.model, "text generator configured");
    match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiGenerator::new(config)),
        ProviderKind::Anthropic => Arc::new(AnthropicGenerator::new(config)),
        ProviderKind::Google => Arc::new(GeminiGenerator::new(config)),
    }
}
